use std::cell::RefCell;
use std::rc::Rc;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use simexp::backend::{RunContext, SimulationBackend};
use simexp::errors::SimexpError;
use simexp::experiment::{Experiment, ExperimentConfig, ExperimentState};
use simexp::model_description::ModelDescriptor;
use simexp::plot::TableExport;
use simexp::sweep::run_sweep;
use simexp::types::{Overrides, ResultTable};
use simexp_base::errors::SimError;

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<String>,
    terminations: usize,
}

/// Backend whose result column `x` holds the value of override `k` (or 0).
/// Fails when `k` is `"fail"`.
struct MockBackend {
    recorded: Rc<RefCell<Recorded>>,
    last_k: f64,
}

impl SimulationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn setup(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        self.recorded.borrow_mut().calls.push(format!("setup:{}", ctx.exp_name));
        Ok(())
    }

    fn init(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        self.recorded.borrow_mut().calls.push(format!("init:{}", ctx.out_file_name));
        Ok(())
    }

    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError> {
        self.recorded.borrow_mut().calls.push(format!("simulate:{}", ctx.out_file_name));
        self.last_k = match additional.get("k").map(String::as_str) {
            Some("fail") => return Err(SimError::SimulationFailure { model: ctx.model_name_full(), log: String::new() }.into()),
            Some(v) => v.parse().map_err(|_| SimError::InvalidParameters(v.to_string()))?,
            None => 0.0,
        };
        Ok(())
    }

    fn extract_results(&mut self, ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError> {
        self.recorded.borrow_mut().calls.push(format!("extract:{}", ctx.out_file_name));
        let sim = &ctx.config.sim_params;
        let mut table = ResultTable::new(vec![sim.start_time, sim.stop_time]);
        for name in trajectory_names {
            table.push_column(name, vec![self.last_k, self.last_k])?;
        }
        Ok(table)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        self.recorded.borrow_mut().terminations += 1;
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    recorded: Rc<RefCell<Recorded>>,
    experiment: Experiment<MockBackend>,
}

#[fixture]
fn fix() -> Fixture {
    let dir = tempfile::tempdir().expect("Could not create temp dir");
    let recorded = Rc::new(RefCell::new(Recorded::default()));
    let config = ExperimentConfig {
        model: ModelDescriptor::new("Lib.Thermal", "Room"),
        result_root_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let backend = MockBackend { recorded: recorded.clone(), last_k: 0.0 };
    let experiment = Experiment::new(config, backend)
        .expect("Could not create experiment")
        .with_plotter(Box::new(TableExport::default()));
    Fixture { dir, recorded, experiment }
}

fn x() -> Vec<String> {
    vec!["x".to_string()]
}

#[rstest]
fn it_follows_the_lifecycle(mut fix: Fixture) {
    assert_eq!(fix.experiment.state(), ExperimentState::Idle);
    fix.experiment.setup_experiment().expect("Setup failed");
    assert_eq!(fix.experiment.state(), ExperimentState::Configured);

    fix.experiment
        .run_experiment("base", &x(), Some(10.0), Some(20.0), false, false)
        .expect("Experiment failed");
    assert_eq!(fix.experiment.state(), ExperimentState::ResultsReady);

    let recorded = fix.recorded.borrow();
    assert_eq!(
        recorded.calls,
        vec!["setup:", "init:results_base", "simulate:results_base", "extract:results_base"]
    );
}

#[rstest]
fn it_sets_time_bounds(mut fix: Fixture) {
    let results = fix
        .experiment
        .run_experiment("bounds", &x(), Some(10.0), Some(20.0), false, false)
        .expect("Experiment failed");
    assert_eq!(results.time(), &[10.0, 20.0]);

    let results = fix
        .experiment
        .run_experiment("kept", &x(), None, Some(30.0), false, false)
        .expect("Experiment failed");
    assert_eq!(results.time(), &[10.0, 30.0]);
}

#[rstest]
fn it_persists_and_plots(mut fix: Fixture) {
    fix.experiment
        .run_experiment("stored", &x(), None, None, true, true)
        .expect("Experiment failed");

    let results_dir = fix.dir.path().join("SimulationResults");
    assert!(results_dir.join("ResultData").join("results_stored.csv").is_file());
    assert!(results_dir.join("Plots").join("results_stored.csv").is_file());
    assert_eq!(fix.experiment.state(), ExperimentState::Plotted);
}

#[rstest]
fn it_survives_a_failed_persistence(mut fix: Fixture) {
    let blocker = fix.experiment.csv_path("results_blocked").unwrap();
    std::fs::create_dir_all(&blocker).unwrap();

    let results = fix
        .experiment
        .run_experiment("blocked", &x(), None, None, false, true)
        .expect("Persistence failure must not fail the run");
    assert_eq!(results.column_names(), vec!["x"]);
}

#[rstest]
fn it_sweeps_in_order(mut fix: Fixture) {
    let runs = run_sweep(&mut fix.experiment, &x(), "k", &[1, 2, 5], false);

    let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Lib_Thermal_Room_k_1", "Lib_Thermal_Room_k_2", "Lib_Thermal_Room_k_5"]);
    let values: Vec<f64> = runs.iter().map(|r| r.table().unwrap().column("x").unwrap()[0]).collect();
    assert_eq!(values, vec![1.0, 2.0, 5.0]);
}

#[rstest]
fn it_sanitizes_sweep_values(mut fix: Fixture) {
    let runs = run_sweep(&mut fix.experiment, &x(), "k", &[0.5, 1.25], false);
    assert_eq!(runs[0].name, "Lib_Thermal_Room_k_0_5");
    assert_eq!(runs[1].name, "Lib_Thermal_Room_k_1_25");
    assert_eq!(runs[1].value, "1.25");
}

#[rstest]
fn it_continues_a_sweep_after_a_failure(mut fix: Fixture) {
    let runs = run_sweep(&mut fix.experiment, &x(), "k", &["1", "fail", "3"], false);

    assert_eq!(runs.len(), 3);
    assert!(runs[0].is_ok());
    assert!(matches!(
        runs[1].result.as_ref().map_err(|e| e.sim_error()),
        Err(Some(SimError::SimulationFailure { .. }))
    ));
    assert_eq!(runs[2].table().unwrap().column("x").unwrap()[0], 3.0);
}

#[rstest]
fn it_runs_the_full_lifecycle_per_sweep_element(mut fix: Fixture) {
    run_sweep(&mut fix.experiment, &x(), "k", &[1, 2], true);

    let recorded = fix.recorded.borrow();
    assert_eq!(
        recorded.calls,
        vec![
            "init:Lib_Thermal_Room_k_1",
            "simulate:Lib_Thermal_Room_k_1",
            "extract:Lib_Thermal_Room_k_1",
            "init:Lib_Thermal_Room_k_2",
            "simulate:Lib_Thermal_Room_k_2",
            "extract:Lib_Thermal_Room_k_2",
        ]
    );
    let data_dir = fix.experiment.data_dir().unwrap();
    assert!(data_dir.join("Lib_Thermal_Room_k_2.csv").is_file());
}

#[rstest]
fn it_plots_sweep_results(mut fix: Fixture) {
    let runs = run_sweep(&mut fix.experiment, &x(), "k", &[0.5, 2.0], false);
    let artifacts = fix
        .experiment
        .plot_sweep_results(&runs, "k", None)
        .expect("Plotting failed");

    let plot_dir = fix.experiment.plot_dir().unwrap();
    assert_eq!(artifacts, vec![plot_dir.join("results_k_0_5.csv"), plot_dir.join("results_k_2.csv")]);
}

#[rstest]
fn it_plots_multiple_results(mut fix: Fixture) {
    let a = fix.experiment.run_experiment("a", &x(), None, None, false, false).unwrap();
    let b = fix.experiment.run_experiment("b", &x(), None, None, false, false).unwrap();
    let artifact = fix
        .experiment
        .plot_multiple_results(&[("a".to_string(), a), ("b".to_string(), b)], Some("compare"))
        .expect("Plotting failed")
        .expect("Plotter configured");

    let header = std::fs::read_to_string(artifact).unwrap().lines().next().unwrap().to_string();
    assert_eq!(header, "Zeitraum;a.x;b.x");
}

#[rstest]
fn it_terminates_on_drop(fix: Fixture) {
    let recorded = fix.recorded.clone();
    drop(fix);
    assert_eq!(recorded.borrow().terminations, 1);
}

#[rstest]
fn it_validates_parameters_before_the_backend_runs(mut fix: Fixture) {
    fix.experiment.config_mut().sim_params.num_intervals = 0;
    let err = fix
        .experiment
        .run_experiment("empty", &x(), Some(0.0), Some(10.0), false, false)
        .expect_err("Zero intervals should be rejected");
    assert!(matches!(err.sim_error(), Some(SimError::InvalidParameters(_))));

    fix.experiment.config_mut().sim_params.num_intervals = 10;
    fix.experiment.set_start_time(Some(20.0));
    let err = fix
        .experiment
        .run_simulation(&x(), false)
        .expect_err("Reversed bounds should be rejected");
    assert!(matches!(err.sim_error(), Some(SimError::InvalidParameters(_))));

    assert!(fix.recorded.borrow().calls.is_empty());
    assert_eq!(fix.experiment.state(), ExperimentState::Idle);
}
