use crate::types::{City, Venue, VenueInput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed venue declared by a single-venue adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultVenue {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Why a candidate's venue could not be tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueRejection {
    MissingName,
    UnsupportedCity(String),
    /// Supported city, but not the one the adapter is scoped to.
    CityMismatch { expected: City, found: City },
}

impl fmt::Display for VenueRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueRejection::MissingName => write!(f, "venue has no name"),
            VenueRejection::UnsupportedCity(city) => write!(f, "unsupported city '{}'", city),
            VenueRejection::CityMismatch { expected, found } => {
                write!(f, "venue in {} but adapter is scoped to {}", found, expected)
            }
        }
    }
}

impl VenueRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueRejection::MissingName => "missing_name",
            VenueRejection::UnsupportedCity(_) => "unsupported_city",
            VenueRejection::CityMismatch { .. } => "city_mismatch",
        }
    }
}

/// Resolves venue identity for candidates from one adapter.
///
/// City comes from the venue object when it states one, otherwise from the
/// adapter's declared city. Free-text venue names are never mined for a city.
#[derive(Debug, Clone)]
pub struct VenueTagger {
    city: City,
    default_venue: Option<DefaultVenue>,
}

impl VenueTagger {
    pub fn new(city: City) -> Self {
        Self {
            city,
            default_venue: None,
        }
    }

    pub fn with_default_venue(city: City, default_venue: Option<DefaultVenue>) -> Self {
        Self { city, default_venue }
    }

    pub fn resolve(&self, input: Option<&VenueInput>) -> Result<Venue, VenueRejection> {
        match input {
            Some(VenueInput::Structured(v)) => {
                let city = match v.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                    Some(raw) => raw
                        .parse::<City>()
                        .map_err(|_| VenueRejection::UnsupportedCity(raw.to_string()))?,
                    None => self.city,
                };
                if city != self.city {
                    return Err(VenueRejection::CityMismatch {
                        expected: self.city,
                        found: city,
                    });
                }
                match non_empty(v.name.as_deref()) {
                    Some(name) => Ok(Venue {
                        name: name.to_string(),
                        address: clean_address(v.address.as_deref(), city),
                        city,
                        coordinates: None,
                    }),
                    None => self.default_or_reject(),
                }
            }
            Some(VenueInput::Text(text)) => match non_empty(Some(text)) {
                Some(name) => {
                    // The declared default venue knows its own address
                    let address = self
                        .default_venue
                        .as_ref()
                        .filter(|d| d.name.trim().eq_ignore_ascii_case(name))
                        .and_then(|d| clean_address(d.address.as_deref(), self.city));
                    Ok(Venue {
                        name: name.to_string(),
                        address,
                        city: self.city,
                        coordinates: None,
                    })
                }
                None => self.default_or_reject(),
            },
            None => self.default_or_reject(),
        }
    }

    fn default_or_reject(&self) -> Result<Venue, VenueRejection> {
        let default = self.default_venue.as_ref().ok_or(VenueRejection::MissingName)?;
        let name = non_empty(Some(&default.name)).ok_or(VenueRejection::MissingName)?;
        Ok(Venue {
            name: name.to_string(),
            address: clean_address(default.address.as_deref(), self.city),
            city: self.city,
            coordinates: None,
        })
    }
}

/// Tags a venue using only the adapter's city context.
pub fn resolve_venue(input: Option<&VenueInput>, city_hint: City) -> Result<Venue, VenueRejection> {
    VenueTagger::new(city_hint).resolve(input)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Blank and bare "City, Region" addresses are the same as no address.
fn clean_address(address: Option<&str>, city: City) -> Option<String> {
    let address = non_empty(address)?;
    if city.is_generic_address(address) {
        None
    } else {
        Some(address.to_string())
    }
}
