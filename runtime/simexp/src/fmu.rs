// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! FMU archives and FMI 2.0 co-simulation slaves.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::{Path, PathBuf};

use libc::size_t;
use libloading::Library;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::errors::SimexpError;

const MODEL_DESCRIPTION_FILE: &str = "modelDescription.xml";

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
const BINARY_PLATFORM: &str = "linux64";
#[cfg(all(target_os = "linux", target_pointer_width = "32"))]
const BINARY_PLATFORM: &str = "linux32";
#[cfg(all(target_os = "windows", target_pointer_width = "64"))]
const BINARY_PLATFORM: &str = "win64";
#[cfg(all(target_os = "windows", target_pointer_width = "32"))]
const BINARY_PLATFORM: &str = "win32";
#[cfg(target_os = "macos")]
const BINARY_PLATFORM: &str = "darwin64";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    Local,
    Independent,
}

impl Causality {
    fn parse(s: &str) -> Causality {
        match s {
            "parameter" => Causality::Parameter,
            "calculatedParameter" => Causality::CalculatedParameter,
            "input" => Causality::Input,
            "output" => Causality::Output,
            "independent" => Causality::Independent,
            _ => Causality::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
    String,
    Enumeration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVariable {
    pub name: String,
    pub value_reference: u32,
    pub causality: Causality,
    pub value_type: VariableType,
    pub start: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoSimulationInfo {
    pub model_identifier: String,
    pub can_handle_variable_step_size: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultExperiment {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>,
}

/// Contents of `modelDescription.xml` relevant for co-simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct FmuModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    pub guid: String,
    pub co_simulation: Option<CoSimulationInfo>,
    pub default_experiment: Option<DefaultExperiment>,
    pub variables: Vec<ScalarVariable>,
}

impl FmuModelDescription {
    pub fn variable(&self, name: &str) -> Option<&ScalarVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Value reference of the real variable `name`.
    pub fn real_value_reference(&self, name: &str) -> Result<u32, SimexpError> {
        match self.variable(name) {
            Some(v) if v.value_type == VariableType::Real => Ok(v.value_reference),
            Some(v) => Err(SimexpError::FmuError(format!(
                "variable `{}` has type {:?}, only Real variables are supported",
                name, v.value_type
            ))),
            None => Err(SimexpError::FmuError(format!("unknown variable `{}`", name))),
        }
    }

    pub fn variables_with_causality(&self, causality: Causality) -> impl Iterator<Item = &ScalarVariable> {
        self.variables.iter().filter(move |v| v.causality == causality)
    }
}

fn parse_f64_attr(node: roxmltree::Node<'_, '_>, name: &str) -> Option<f64> {
    node.attribute(name).and_then(|v| v.parse().ok())
}

/// Parse an FMI 2.0 model description.
pub fn parse_model_description(xml: &str) -> Result<FmuModelDescription, SimexpError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "fmiModelDescription" {
        return Err(SimexpError::FmuError(format!(
            "unexpected root element `{}` in model description",
            root.tag_name().name()
        )));
    }

    let required = |name: &str| {
        root.attribute(name)
            .map(String::from)
            .ok_or_else(|| SimexpError::FmuError(format!("model description lacks attribute `{}`", name)))
    };

    let mut md = FmuModelDescription {
        fmi_version: required("fmiVersion")?,
        model_name: required("modelName")?,
        guid: required("guid")?,
        co_simulation: None,
        default_experiment: None,
        variables: Vec::new(),
    };

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "CoSimulation" => {
                md.co_simulation = Some(CoSimulationInfo {
                    model_identifier: child
                        .attribute("modelIdentifier")
                        .ok_or_else(|| SimexpError::FmuError(String::from("CoSimulation lacks modelIdentifier")))?
                        .to_string(),
                    can_handle_variable_step_size: child.attribute("canHandleVariableCommunicationStepSize")
                        == Some("true"),
                });
            }
            "DefaultExperiment" => {
                md.default_experiment = Some(DefaultExperiment {
                    start_time: parse_f64_attr(child, "startTime"),
                    stop_time: parse_f64_attr(child, "stopTime"),
                    tolerance: parse_f64_attr(child, "tolerance"),
                    step_size: parse_f64_attr(child, "stepSize"),
                });
            }
            "ModelVariables" => {
                for sv in child.children().filter(|n| n.has_tag_name("ScalarVariable")) {
                    md.variables.push(parse_scalar_variable(sv)?);
                }
            }
            _ => {}
        }
    }

    Ok(md)
}

fn parse_scalar_variable(sv: roxmltree::Node<'_, '_>) -> Result<ScalarVariable, SimexpError> {
    let name = sv
        .attribute("name")
        .ok_or_else(|| SimexpError::FmuError(String::from("ScalarVariable without name")))?;
    let value_reference = sv
        .attribute("valueReference")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SimexpError::FmuError(format!("invalid valueReference for `{}`", name)))?;

    let type_node = sv
        .children()
        .find(|n| n.is_element())
        .ok_or_else(|| SimexpError::FmuError(format!("missing type element for `{}`", name)))?;
    let value_type = match type_node.tag_name().name() {
        "Real" => VariableType::Real,
        "Integer" => VariableType::Integer,
        "Boolean" => VariableType::Boolean,
        "String" => VariableType::String,
        "Enumeration" => VariableType::Enumeration,
        other => return Err(SimexpError::FmuError(format!("unknown type `{}` for `{}`", other, name))),
    };

    Ok(ScalarVariable {
        name: name.to_string(),
        value_reference,
        causality: Causality::parse(sv.attribute("causality").unwrap_or("local")),
        value_type,
        start: type_node.attribute("start").map(String::from),
    })
}

/// An FMU unpacked into its own scratch directory. The directory is removed
/// when the archive is dropped.
#[derive(Debug)]
pub struct FmuArchive {
    fmu_path: PathBuf,
    unzip_dir: TempDir,
    model_description: FmuModelDescription,
}

impl FmuArchive {
    /// Unpack the FMU at `fmu_path` and read its model description.
    pub fn extract<P: AsRef<Path>>(fmu_path: P) -> Result<FmuArchive, SimexpError> {
        let fmu_path = fmu_path.as_ref().to_path_buf();
        let unzip_dir = tempfile::Builder::new().prefix("simexp_fmu_").tempdir()?;

        zip::ZipArchive::new(File::open(&fmu_path)?)?.extract(unzip_dir.path())?;
        let xml = std::fs::read_to_string(unzip_dir.path().join(MODEL_DESCRIPTION_FILE))?;
        let model_description = parse_model_description(&xml)?;

        debug!(fmu = %fmu_path.display(), dir = %unzip_dir.path().display(), "extracted FMU");
        Ok(FmuArchive { fmu_path, unzip_dir, model_description })
    }

    pub fn fmu_path(&self) -> &Path {
        &self.fmu_path
    }

    pub fn unzip_dir(&self) -> &Path {
        self.unzip_dir.path()
    }

    pub fn model_description(&self) -> &FmuModelDescription {
        &self.model_description
    }

    /// Model identifier of the co-simulation implementation.
    pub fn model_identifier(&self) -> Result<&str, SimexpError> {
        self.model_description
            .co_simulation
            .as_ref()
            .map(|cs| cs.model_identifier.as_str())
            .ok_or_else(|| SimexpError::FmuError(format!("`{}` does not support co-simulation", self.fmu_path.display())))
    }

    /// Path of the platform shared library.
    pub fn binary_path(&self) -> Result<PathBuf, SimexpError> {
        let file = format!("{}{}", self.model_identifier()?, std::env::consts::DLL_SUFFIX);
        Ok(self.unzip_dir().join("binaries").join(BINARY_PLATFORM).join(file))
    }

    /// `file://` URI of the resources directory.
    pub fn resource_location(&self) -> String {
        let path = self.unzip_dir().join("resources").display().to_string().replace('\\', "/");
        if path.starts_with('/') {
            format!("file://{}", path)
        } else {
            format!("file:///{}", path)
        }
    }
}

/// A co-simulation slave. Value references come from the model description.
pub trait CoSimSlave {
    fn setup_experiment(&mut self, tolerance: Option<f64>, start_time: f64, stop_time: Option<f64>) -> Result<(), SimexpError>;
    fn enter_initialization_mode(&mut self) -> Result<(), SimexpError>;
    fn exit_initialization_mode(&mut self) -> Result<(), SimexpError>;
    fn set_real(&mut self, value_references: &[u32], values: &[f64]) -> Result<(), SimexpError>;
    fn get_real(&mut self, value_references: &[u32]) -> Result<Vec<f64>, SimexpError>;
    fn do_step(&mut self, current_time: f64, step_size: f64) -> Result<(), SimexpError>;
    fn terminate(&mut self) -> Result<(), SimexpError>;
    /// Return to the freshly instantiated state.
    fn reset(&mut self) -> Result<(), SimexpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fmi2Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl From<c_int> for Fmi2Status {
    fn from(st: c_int) -> Self {
        match st {
            0 => Fmi2Status::Ok,
            1 => Fmi2Status::Warning,
            2 => Fmi2Status::Discard,
            3 => Fmi2Status::Error,
            4 => Fmi2Status::Fatal,
            _ => Fmi2Status::Pending,
        }
    }
}

fn check_status(function: &str, status: c_int) -> Result<(), SimexpError> {
    match Fmi2Status::from(status) {
        Fmi2Status::Ok => Ok(()),
        Fmi2Status::Warning => {
            warn!(function, "FMU returned warning");
            Ok(())
        }
        other => Err(SimexpError::FmuError(format!("{} returned {:?}", function, other))),
    }
}

type Component = *mut c_void;
type LoggerFn = unsafe extern "C" fn(*mut c_void, *const c_char, c_int, *const c_char, *const c_char);
type AllocateFn = unsafe extern "C" fn(size_t, size_t) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type StepFinishedFn = unsafe extern "C" fn(*mut c_void, c_int);

#[repr(C)]
struct CallbackFunctions {
    logger: LoggerFn,
    allocate_memory: AllocateFn,
    free_memory: FreeFn,
    step_finished: Option<StepFinishedFn>,
    component_environment: *mut c_void,
}

type InstantiateFn =
    unsafe extern "C" fn(*const c_char, c_int, *const c_char, *const c_char, *const CallbackFunctions, c_int, c_int) -> Component;
type FreeInstanceFn = unsafe extern "C" fn(Component);
type SetupExperimentFn = unsafe extern "C" fn(Component, c_int, f64, f64, c_int, f64) -> c_int;
type ComponentFn = unsafe extern "C" fn(Component) -> c_int;
type SetRealFn = unsafe extern "C" fn(Component, *const c_uint, size_t, *const f64) -> c_int;
type GetRealFn = unsafe extern "C" fn(Component, *const c_uint, size_t, *mut f64) -> c_int;
type DoStepFn = unsafe extern "C" fn(Component, f64, f64, c_int) -> c_int;

const FMI2_COSIMULATION: c_int = 1;

unsafe fn c_text(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        CStr::from_ptr(p).to_string_lossy().into_owned()
    }
}

// Variadic arguments of the message are not expanded.
unsafe extern "C" fn log_message(
    _env: *mut c_void,
    instance: *const c_char,
    status: c_int,
    category: *const c_char,
    message: *const c_char,
) {
    let (instance, category, message) = (c_text(instance), c_text(category), c_text(message));
    match Fmi2Status::from(status) {
        Fmi2Status::Ok => debug!(instance = %instance, category = %category, "{}", message),
        Fmi2Status::Warning => warn!(instance = %instance, category = %category, "{}", message),
        _ => error!(instance = %instance, category = %category, "{}", message),
    }
}

unsafe extern "C" fn allocate_memory(count: size_t, size: size_t) -> *mut c_void {
    libc::calloc(count, size)
}

unsafe extern "C" fn free_memory(p: *mut c_void) {
    libc::free(p)
}

struct Fmi2Api {
    free_instance: FreeInstanceFn,
    setup_experiment: SetupExperimentFn,
    enter_initialization_mode: ComponentFn,
    exit_initialization_mode: ComponentFn,
    terminate: ComponentFn,
    reset: ComponentFn,
    set_real: SetRealFn,
    get_real: GetRealFn,
    do_step: DoStepFn,
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, SimexpError> {
    Ok(*lib.get::<T>(name)?)
}

/// FMI 2.0 co-simulation slave backed by the FMU's shared library.
pub struct Fmi2Slave {
    api: Fmi2Api,
    component: Component,
    _callbacks: Box<CallbackFunctions>,
    _lib: Library,
}

impl Fmi2Slave {
    /// Load the FMU binary of `archive` and instantiate one slave named `instance_name`.
    pub fn instantiate(archive: &FmuArchive, instance_name: &str) -> Result<Fmi2Slave, SimexpError> {
        let md = archive.model_description();
        let binary = archive.binary_path()?;
        info!(binary = %binary.display(), instance = instance_name, "loading FMU binary");

        let lib = unsafe { Library::new(&binary)? };
        let (instantiate, api) = unsafe {
            let instantiate: InstantiateFn = symbol(&lib, b"fmi2Instantiate\0")?;
            let api = Fmi2Api {
                free_instance: symbol(&lib, b"fmi2FreeInstance\0")?,
                setup_experiment: symbol(&lib, b"fmi2SetupExperiment\0")?,
                enter_initialization_mode: symbol(&lib, b"fmi2EnterInitializationMode\0")?,
                exit_initialization_mode: symbol(&lib, b"fmi2ExitInitializationMode\0")?,
                terminate: symbol(&lib, b"fmi2Terminate\0")?,
                reset: symbol(&lib, b"fmi2Reset\0")?,
                set_real: symbol(&lib, b"fmi2SetReal\0")?,
                get_real: symbol(&lib, b"fmi2GetReal\0")?,
                do_step: symbol(&lib, b"fmi2DoStep\0")?,
            };
            (instantiate, api)
        };

        let callbacks = Box::new(CallbackFunctions {
            logger: log_message,
            allocate_memory,
            free_memory,
            step_finished: None,
            component_environment: std::ptr::null_mut(),
        });

        let c_name = CString::new(instance_name).map_err(|e| SimexpError::FmuError(e.to_string()))?;
        let c_guid = CString::new(md.guid.as_str()).map_err(|e| SimexpError::FmuError(e.to_string()))?;
        let c_resources = CString::new(archive.resource_location()).map_err(|e| SimexpError::FmuError(e.to_string()))?;

        let component = unsafe {
            instantiate(
                c_name.as_ptr(),
                FMI2_COSIMULATION,
                c_guid.as_ptr(),
                c_resources.as_ptr(),
                callbacks.as_ref(),
                0,
                0,
            )
        };
        if component.is_null() {
            return Err(SimexpError::FmuError(format!("fmi2Instantiate failed for `{}`", instance_name)));
        }

        Ok(Fmi2Slave { api, component, _callbacks: callbacks, _lib: lib })
    }
}

impl CoSimSlave for Fmi2Slave {
    fn setup_experiment(&mut self, tolerance: Option<f64>, start_time: f64, stop_time: Option<f64>) -> Result<(), SimexpError> {
        let status = unsafe {
            (self.api.setup_experiment)(
                self.component,
                c_int::from(tolerance.is_some()),
                tolerance.unwrap_or(0.0),
                start_time,
                c_int::from(stop_time.is_some()),
                stop_time.unwrap_or(0.0),
            )
        };
        check_status("fmi2SetupExperiment", status)
    }

    fn enter_initialization_mode(&mut self) -> Result<(), SimexpError> {
        check_status("fmi2EnterInitializationMode", unsafe { (self.api.enter_initialization_mode)(self.component) })
    }

    fn exit_initialization_mode(&mut self) -> Result<(), SimexpError> {
        check_status("fmi2ExitInitializationMode", unsafe { (self.api.exit_initialization_mode)(self.component) })
    }

    fn set_real(&mut self, value_references: &[u32], values: &[f64]) -> Result<(), SimexpError> {
        if value_references.len() != values.len() {
            return Err(SimexpError::FmuError(String::from("value reference and value counts differ")));
        }
        let status = unsafe {
            (self.api.set_real)(self.component, value_references.as_ptr(), value_references.len(), values.as_ptr())
        };
        check_status("fmi2SetReal", status)
    }

    fn get_real(&mut self, value_references: &[u32]) -> Result<Vec<f64>, SimexpError> {
        let mut values = vec![0.0; value_references.len()];
        let status = unsafe {
            (self.api.get_real)(self.component, value_references.as_ptr(), value_references.len(), values.as_mut_ptr())
        };
        check_status("fmi2GetReal", status)?;
        Ok(values)
    }

    fn do_step(&mut self, current_time: f64, step_size: f64) -> Result<(), SimexpError> {
        let status = unsafe { (self.api.do_step)(self.component, current_time, step_size, 1) };
        check_status("fmi2DoStep", status)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        check_status("fmi2Terminate", unsafe { (self.api.terminate)(self.component) })
    }

    fn reset(&mut self) -> Result<(), SimexpError> {
        check_status("fmi2Reset", unsafe { (self.api.reset)(self.component) })
    }
}

impl Drop for Fmi2Slave {
    fn drop(&mut self) {
        if !self.component.is_null() {
            unsafe { (self.api.free_instance)(self.component) };
            self.component = std::ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_DESCRIPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="2.0" modelName="Tank" guid="{8c4e810f-3df3-4a00-8276-176fa3c9f000}">
  <CoSimulation modelIdentifier="Tank" canHandleVariableCommunicationStepSize="true"/>
  <DefaultExperiment startTime="0" stopTime="10" stepSize="0.1"/>
  <ModelVariables>
    <ScalarVariable name="u" valueReference="1" causality="input"><Real start="0"/></ScalarVariable>
    <ScalarVariable name="y" valueReference="2" causality="output"><Real/></ScalarVariable>
    <ScalarVariable name="n" valueReference="3" causality="parameter"><Integer start="4"/></ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

    #[test]
    fn parses_model_description() {
        let md = parse_model_description(MODEL_DESCRIPTION).unwrap();

        assert_eq!(md.fmi_version, "2.0");
        assert_eq!(md.guid, "{8c4e810f-3df3-4a00-8276-176fa3c9f000}");
        assert_eq!(md.co_simulation.as_ref().unwrap().model_identifier, "Tank");
        assert_eq!(md.default_experiment.as_ref().unwrap().step_size, Some(0.1));
        assert_eq!(md.variables.len(), 3);
        assert_eq!(md.variable("u").unwrap().causality, Causality::Input);
        assert_eq!(md.variable("u").unwrap().start.as_deref(), Some("0"));
        assert_eq!(md.variables_with_causality(Causality::Output).count(), 1);
    }

    #[test]
    fn value_references_only_for_reals() {
        let md = parse_model_description(MODEL_DESCRIPTION).unwrap();

        assert_eq!(md.real_value_reference("y").unwrap(), 2);
        assert!(md.real_value_reference("n").is_err());
        assert!(md.real_value_reference("missing").is_err());
    }

    #[test]
    fn rejects_foreign_documents() {
        assert!(parse_model_description("<html/>").is_err());
    }

    #[test]
    fn status_mapping() {
        assert!(check_status("f", 0).is_ok());
        assert!(check_status("f", 1).is_ok());
        assert!(check_status("f", 3).is_err());
        assert_eq!(Fmi2Status::from(4), Fmi2Status::Fatal);
    }
}
