use crate::types::FastMap;

use serde::{Deserialize, Serialize};

/// Treatment assignment of one chamber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChamberConfig {
    pub chamber: u32,
    pub treatment: String,
    pub replicate: u32,
}

impl ChamberConfig {
    pub fn new(chamber: u32, treatment: impl Into<String>, replicate: u32) -> Self {
        Self { chamber, treatment: treatment.into(), replicate }
    }
}

/// Lookup of chamber assignments by chamber id. When an id is listed twice the first entry
/// wins.
#[derive(Debug, Clone, Default)]
pub struct ChamberRegistry {
    chambers: FastMap<u32, ChamberConfig>,
}

impl ChamberRegistry {
    pub fn from_configs(configs: &[ChamberConfig]) -> Self {
        let mut chambers = FastMap::default();
        for cfg in configs {
            chambers.entry(cfg.chamber).or_insert_with(|| cfg.clone());
        }
        Self { chambers }
    }

    pub fn get(&self, chamber: u32) -> Option<&ChamberConfig> {
        self.chambers.get(&chamber)
    }

    pub fn len(&self) -> usize {
        self.chambers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chambers.is_empty()
    }
}
