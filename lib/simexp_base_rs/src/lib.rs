// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

pub mod errors;
pub mod layout;
pub mod model_description;
pub mod parameters;
pub mod result_io;
pub mod types;
