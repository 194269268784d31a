//! Data-directory configuration.
//!
//! A store's database file and its archives live under one data directory.
//! [`Settings::load`] reads an optional `larder.*` config file from the
//! working directory and a `LARDER_`-prefixed environment source.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::Result;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Settings> {
        let settings = Config::builder()
            .set_default("data_dir", "dat")?
            .add_source(File::with_name("larder").required(false))
            .add_source(Environment::with_prefix("LARDER"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings { data_dir: PathBuf::from("dat") }
    }
}
