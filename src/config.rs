//! Session options read when the functions are registered.

use std::fmt::Display;

use datafusion::common::config_namespace;
use datafusion::config::{ConfigEntry, ConfigExtension, ConfigField, ExtensionOptions, Visit};
use datafusion::error::Result;
use datafusion::prelude::SessionConfig;

use crate::codec::{decimal_digits, DEFAULT_MAX_DECIMAL_DIGITS, MAX_GEOHASH_PRECISION};

/// Add [`GeometryOptions`] to a session config so that they can be changed with `SET`.
pub fn add_geometry_option_extension(config: SessionConfig) -> SessionConfig {
    config.with_option_extension(GeometryOptions::default())
}

config_namespace! {
    /// Defaults for the geometry output functions.
    pub struct GeometryOptions {
        /// Decimal digits written by ST_AsText and ST_AsGeoJSON without an explicit argument
        pub max_decimal_digits: usize, default = DEFAULT_MAX_DECIMAL_DIGITS

        /// Characters written by ST_GeoHash for a point without an explicit argument
        pub geohash_precision: usize, default = MAX_GEOHASH_PRECISION
    }
}

impl GeometryOptions {
    /// The options stored in `config`, or the defaults when the extension is absent.
    pub fn from_session_config(config: &SessionConfig) -> Self {
        config
            .options()
            .extensions
            .get::<GeometryOptions>()
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn decimal_digits(&self) -> usize {
        decimal_digits(Some(self.max_decimal_digits))
    }

    pub(crate) fn geohash_characters(&self) -> usize {
        self.geohash_precision.clamp(1, MAX_GEOHASH_PRECISION)
    }
}

impl ConfigExtension for GeometryOptions {
    const PREFIX: &'static str = "geoblob";
}

impl ExtensionOptions for GeometryOptions {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn cloned(&self) -> Box<dyn ExtensionOptions> {
        Box::new(self.clone())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        <Self as ConfigField>::set(self, key, value)
    }

    fn entries(&self) -> Vec<ConfigEntry> {
        struct Visitor(Vec<ConfigEntry>);

        impl Visit for Visitor {
            fn some<V: Display>(&mut self, key: &str, value: V, description: &'static str) {
                self.0.push(ConfigEntry {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                    description,
                })
            }

            fn none(&mut self, key: &str, description: &'static str) {
                self.0.push(ConfigEntry {
                    key: key.to_string(),
                    value: None,
                    description,
                })
            }
        }

        let mut v = Visitor(vec![]);
        self.visit(&mut v, Self::PREFIX, "");
        v.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let options = GeometryOptions::default();
        assert_eq!(options.max_decimal_digits, 15);
        assert_eq!(options.geohash_precision, 12);
        assert_eq!(
            GeometryOptions::from_session_config(&SessionConfig::new()),
            options
        );
    }

    #[test]
    fn set_through_session_config() {
        let mut config = add_geometry_option_extension(SessionConfig::new());
        config
            .options_mut()
            .set("geoblob.max_decimal_digits", "4")
            .unwrap();
        config
            .options_mut()
            .set("geoblob.geohash_precision", "40")
            .unwrap();
        let options = GeometryOptions::from_session_config(&config);
        assert_eq!(options.max_decimal_digits, 4);
        assert_eq!(options.decimal_digits(), 4);
        assert_eq!(options.geohash_characters(), 12);

        config
            .options_mut()
            .set("geoblob.max_decimal_digits", "70000")
            .unwrap();
        let options = GeometryOptions::from_session_config(&config);
        assert_eq!(options.decimal_digits(), DEFAULT_MAX_DECIMAL_DIGITS);
    }
}
