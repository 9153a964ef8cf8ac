// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Identity of a model or sub-component taking part in an experiment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelDescriptor {
    pub package_name: String,
    pub model_name: String,
    pub instance_name: String,
    pub parameters: BTreeMap<String, String>,
    /// Inputs with mapping to a variable of the surrounding model
    pub inputs: BTreeMap<String, String>,
    pub outputs: Vec<String>,
    pub fmu_path: Option<PathBuf>,
    pub is_fmu: bool,
    pub is_exchange_model: bool,
    pub is_initial_exchange_model: bool,
}

impl Default for ModelDescriptor {
    fn default() -> Self {
        ModelDescriptor {
            package_name: String::new(),
            model_name: String::new(),
            instance_name: String::from("UUT"),
            parameters: BTreeMap::new(),
            inputs: BTreeMap::new(),
            outputs: Vec::new(),
            fmu_path: None,
            is_fmu: false,
            is_exchange_model: false,
            is_initial_exchange_model: false,
        }
    }
}

impl ModelDescriptor {
    pub fn new(package_name: &str, model_name: &str) -> ModelDescriptor {
        ModelDescriptor {
            package_name: package_name.to_string(),
            model_name: model_name.to_string(),
            ..Default::default()
        }
    }

    /// Fully qualified name `package.model`; just the model name if no package is set.
    pub fn model_name_full(&self) -> String {
        if self.package_name.is_empty() {
            self.model_name.clone()
        } else {
            format!("{}.{}", self.package_name, self.model_name)
        }
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> ModelDescriptor {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}
