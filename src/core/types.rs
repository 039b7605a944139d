//! Core type definitions used throughout the codebase

use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::error::HazardError;

/// Intensity measure family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IMType {
    PGA,
    PGV,
    #[serde(rename = "pSA")]
    PSA,
    CAV,
    AI,
    Ds575,
    Ds595,
}

impl IMType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IMType::PGA => "PGA",
            IMType::PGV => "PGV",
            IMType::PSA => "pSA",
            IMType::CAV => "CAV",
            IMType::AI => "AI",
            IMType::Ds575 => "Ds575",
            IMType::Ds595 => "Ds595",
        }
    }

    /// Exponent applied to an amplitude scale factor for this IM type
    ///
    /// Amplitude IMs scale linearly, Arias intensity with the square of the
    /// factor, and durations are unaffected by scaling.
    pub fn scale_exponent(&self) -> f64 {
        match self {
            IMType::PGA | IMType::PGV | IMType::PSA | IMType::CAV => 1.0,
            IMType::AI => 2.0,
            IMType::Ds575 | IMType::Ds595 => 0.0,
        }
    }
}

impl fmt::Display for IMType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IMType {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PGA" => Ok(IMType::PGA),
            "PGV" => Ok(IMType::PGV),
            "pSA" | "PSA" => Ok(IMType::PSA),
            "CAV" => Ok(IMType::CAV),
            "AI" => Ok(IMType::AI),
            "Ds575" => Ok(IMType::Ds575),
            "Ds595" => Ok(IMType::Ds595),
            other => Err(HazardError::InvalidConfig(format!("Unknown IM type: {}", other))),
        }
    }
}

/// Horizontal component definition of an IM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IMComponent {
    #[default]
    RotD50,
    RotD100,
    Larger,
}

impl IMComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            IMComponent::RotD50 => "RotD50",
            IMComponent::RotD100 => "RotD100",
            IMComponent::Larger => "Larger",
        }
    }
}

impl FromStr for IMComponent {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RotD50" => Ok(IMComponent::RotD50),
            "RotD100" => Ok(IMComponent::RotD100),
            "Larger" => Ok(IMComponent::Larger),
            other => Err(HazardError::InvalidConfig(format!("Unknown IM component: {}", other))),
        }
    }
}

/// An intensity measure, e.g. `PGA` or `pSA_0.5`
///
/// The string form is `<type>[_<period>][@<component>]`, where the component
/// suffix is omitted for the default RotD50 component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IM {
    pub im_type: IMType,
    pub period: Option<OrderedFloat<f64>>,
    pub component: IMComponent,
}

impl IM {
    pub fn new(im_type: IMType) -> Self {
        Self { im_type, period: None, component: IMComponent::default() }
    }

    pub fn psa(period: f64) -> Self {
        Self {
            im_type: IMType::PSA,
            period: Some(OrderedFloat(period)),
            component: IMComponent::default(),
        }
    }

    pub fn with_component(mut self, component: IMComponent) -> Self {
        self.component = component;
        self
    }

    pub fn is_psa(&self) -> bool {
        self.im_type == IMType::PSA
    }

    pub fn period(&self) -> Option<f64> {
        self.period.map(|p| p.0)
    }

    /// Period used by the spectral correlation models (PGA is treated as 0.01s)
    pub fn correlation_period(&self) -> Option<f64> {
        match self.im_type {
            IMType::PGA => Some(0.01),
            IMType::PSA => self.period(),
            _ => None,
        }
    }
}

impl fmt::Display for IM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.im_type)?;
        if let Some(period) = self.period {
            write!(f, "_{}", period.0)?;
        }
        if self.component != IMComponent::default() {
            write!(f, "@{}", self.component.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for IM {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, component) = match s.split_once('@') {
            Some((body, comp)) => (body, comp.parse()?),
            None => (s, IMComponent::default()),
        };
        let (im_type, period) = match body.split_once('_') {
            Some((ty, period)) => {
                let period: f64 = period
                    .parse()
                    .map_err(|_| HazardError::InvalidConfig(format!("Invalid IM period in '{}'", s)))?;
                (ty.parse::<IMType>()?, Some(OrderedFloat(period)))
            }
            None => (body.parse::<IMType>()?, None),
        };

        if im_type == IMType::PSA && period.is_none() {
            return Err(HazardError::InvalidConfig(format!("pSA requires a period: '{}'", s)));
        }
        if im_type != IMType::PSA && period.is_some() {
            return Err(HazardError::InvalidConfig(format!("Only pSA takes a period: '{}'", s)));
        }

        Ok(Self { im_type, period, component })
    }
}

impl From<IM> for String {
    fn from(im: IM) -> Self {
        im.to_string()
    }
}

impl TryFrom<String> for IM {
    type Error = HazardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Seismic source category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Fault,
    Distributed,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Fault => f.write_str("fault"),
            SourceType::Distributed => f.write_str("distributed"),
        }
    }
}

/// Tectonic classification of a rupture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TectonicType {
    ActiveShallow,
    SubductionInterface,
    SubductionSlab,
    Volcanic,
}

/// Whether IM data is given as lognormal parameters or as realisations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IMDataType {
    Parametric,
    NonParametric,
    /// Branches disagree; only ever reported at the IM-ensemble level
    Mixed,
}

/// Compact rupture index, assigned once per ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuptureId(pub u32);

/// Site of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub station_name: String,
    pub lat: f64,
    pub lon: f64,
    pub vs30: f64,
    #[serde(default)]
    pub z1p0: Option<f64>,
    #[serde(default)]
    pub z2p5: Option<f64>,
}

impl SiteInfo {
    pub fn new(station_name: impl Into<String>, lat: f64, lon: f64, vs30: f64) -> Self {
        Self { station_name: station_name.into(), lat, lon, vs30, z1p0: None, z2p5: None }
    }
}
