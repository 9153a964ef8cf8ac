// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

pub mod backend;
pub mod commands;
pub mod cosim;
pub mod dymola;
pub mod engine;
pub mod errors;
pub mod experiment;
pub mod fmu;
pub mod native;
pub mod plot;
pub mod script;
pub mod sweep;
pub mod variant;

pub use simexp_base::{layout, model_description, parameters, result_io, types};
