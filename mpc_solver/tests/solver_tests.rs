//! Solver loop against a live segment under /dev/shm, with the test playing
//! the controller side through a second handle.

use mpc_common::config::BridgeConfig;
use mpc_common::consts::TARGET_DIM;
use mpc_common::law::{ControlLaw, Dimensions};
use mpc_shared_memory::{BootstrapFlags, ExchangeSegment};
use mpc_solver::{OcpSolver, SolveError, SolverLoop, SolverState, StepOutcome, WarmStart};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Unique segment name, unlinked on drop
struct TestSegment(String);

impl TestSegment {
    fn new(tag: &str) -> Self {
        let name = format!("mpc_solver_test_{}_{}", std::process::id(), tag);
        let _ = ExchangeSegment::remove(&name);
        Self(name)
    }

    fn open(&self, dims: Dimensions) -> ExchangeSegment {
        ExchangeSegment::open(&self.0, dims).unwrap()
    }
}

impl Drop for TestSegment {
    fn drop(&mut self) {
        let _ = ExchangeSegment::remove(&self.0);
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::from_toml(
        "[shared]\nservice_name = \"solver-it\"\n[robot]\njoint_names = [\"j1\", \"j2\"]\n",
    )
    .unwrap()
}

/// Records every target it is asked to solve for; optionally parks inside
/// `solve` until released.
struct RecordingSolver {
    dims: Dimensions,
    targets: Vec<[f64; TARGET_DIM]>,
    warm: Vec<bool>,
    gate: Option<(Sender<()>, Receiver<()>)>,
    fail_next: bool,
}

impl RecordingSolver {
    fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            targets: Vec::new(),
            warm: Vec::new(),
            gate: None,
            fail_next: false,
        }
    }
}

impl OcpSolver for RecordingSolver {
    fn dims(&self) -> Dimensions {
        self.dims
    }

    fn solve(
        &mut self,
        x0: &[f64],
        target: &[f64; TARGET_DIM],
        warm_start: WarmStart<'_>,
        law: &mut ControlLaw,
    ) -> Result<(), SolveError> {
        self.targets.push(*target);
        self.warm.push(matches!(warm_start, WarmStart::Previous(_)));
        if let Some((started, release)) = &self.gate {
            started.send(()).unwrap();
            release.recv().unwrap();
        }
        if std::mem::take(&mut self.fail_next) {
            return Err(SolveError::NotConverged { iterations: 1 });
        }
        law.xs0.copy_from_slice(x0);
        law.xs1.copy_from_slice(x0);
        law.us.iter_mut().for_each(|u| *u = target[0]);
        Ok(())
    }
}

#[test]
fn test_target_changed_during_solve_applies_to_next_solve() {
    let config = config();
    let dims = config.dims().unwrap();
    let seg = TestSegment::new("inflight");
    let controller = seg.open(dims);

    let (started_tx, started_rx) = channel();
    let (release_tx, release_rx) = channel();
    let mut solver = RecordingSolver::new(dims);
    solver.gate = Some((started_tx, release_rx));
    let mut sl = SolverLoop::new(&config, seg.open(dims), solver, None).unwrap();

    let old_target = [0.1, 0.2, 0.3];
    let new_target = [0.7, 0.8, 0.9];
    {
        let mut guard = controller.lock().unwrap();
        guard.write_measured_state(&[0.0; 4], 0.0).unwrap();
        guard.write_target(&old_target);
    }

    thread::scope(|s| {
        let solving = s.spawn(|| sl.step().unwrap());

        started_rx.recv().unwrap();
        // The segment is free while the solve runs
        controller.lock().unwrap().write_target(&new_target);
        release_tx.send(()).unwrap();

        let first = solving.join().unwrap();
        assert!(matches!(first, StepOutcome::Solved { .. }));
    });

    release_tx.send(()).unwrap();
    let second = sl.step().unwrap();
    assert!(matches!(second, StepOutcome::Solved { .. }));

    assert_eq!(sl.solver().targets, vec![old_target, new_target]);
    assert_eq!(sl.solver().warm, vec![false, true]);

    let guard = controller.lock().unwrap();
    let mut law = ControlLaw::zeros(dims);
    guard.read_law_into(&mut law).unwrap();
    assert_eq!(law.us[0], new_target[0]);
}

#[test]
fn test_failure_retains_law_and_loop_continues() {
    let config = config();
    let dims = config.dims().unwrap();
    let seg = TestSegment::new("failure");
    let controller = seg.open(dims);
    let mut sl = SolverLoop::new(&config, seg.open(dims), RecordingSolver::new(dims), None).unwrap();

    {
        let mut guard = controller.lock().unwrap();
        guard.write_measured_state(&[0.0; 4], 2.0).unwrap();
        guard.write_target(&[1.0, 0.0, 0.0]);
    }
    assert!(matches!(sl.step().unwrap(), StepOutcome::Solved { .. }));

    {
        let mut guard = controller.lock().unwrap();
        guard.write_measured_state(&[0.0; 4], 3.0).unwrap();
        guard.write_target(&[5.0, 0.0, 0.0]);
    }
    sl.solver_mut().fail_next = true;
    assert!(matches!(
        sl.step().unwrap(),
        StepOutcome::Failed(SolveError::NotConverged { .. })
    ));
    assert_eq!(sl.state(), SolverState::IdleBetweenSolves);

    {
        let guard = controller.lock().unwrap();
        assert_eq!(guard.law_time(), 2.0);
        let mut law = ControlLaw::zeros(dims);
        guard.read_law_into(&mut law).unwrap();
        assert_eq!(law.us[0], 1.0);
    }

    // Next pass succeeds again with the new target
    assert!(matches!(sl.step().unwrap(), StepOutcome::Solved { law_time, .. } if law_time == 3.0));
    assert_eq!(sl.stats().solves, 2);
    assert_eq!(sl.stats().failures, 1);
}

#[test]
fn test_law_with_wrong_values_is_not_published() {
    struct NanSolver(Dimensions);
    impl OcpSolver for NanSolver {
        fn dims(&self) -> Dimensions {
            self.0
        }
        fn solve(
            &mut self,
            _x0: &[f64],
            _target: &[f64; TARGET_DIM],
            _warm_start: WarmStart<'_>,
            law: &mut ControlLaw,
        ) -> Result<(), SolveError> {
            law.ks[0] = f64::NAN;
            Ok(())
        }
    }

    let config = config();
    let dims = config.dims().unwrap();
    let seg = TestSegment::new("nan");
    let controller = seg.open(dims);
    let mut sl = SolverLoop::new(&config, seg.open(dims), NanSolver(dims), None).unwrap();
    controller
        .lock()
        .unwrap()
        .write_measured_state(&[0.0; 4], 0.0)
        .unwrap();

    assert!(matches!(sl.step().unwrap(), StepOutcome::Failed(SolveError::Dimension(_))));
    let guard = controller.lock().unwrap();
    assert!(!guard.has_law());
    assert!(!guard.flags().contains(BootstrapFlags::SOLVER_STARTED));
}

#[test]
fn test_ticks_per_solve_follow_state_sequence() {
    let config = config();
    let dims = config.dims().unwrap();
    let seg = TestSegment::new("ticks");
    let controller = seg.open(dims);
    let mut sl = SolverLoop::new(&config, seg.open(dims), RecordingSolver::new(dims), None).unwrap();

    for k in 0..5 {
        controller
            .lock()
            .unwrap()
            .write_measured_state(&[0.0; 4], k as f64 * 1e-3)
            .unwrap();
    }
    assert!(matches!(sl.step().unwrap(), StepOutcome::Solved { ticks: 5, .. }));
    for k in 5..8 {
        controller
            .lock()
            .unwrap()
            .write_measured_state(&[0.0; 4], k as f64 * 1e-3)
            .unwrap();
    }
    thread::sleep(Duration::from_millis(1));
    assert!(matches!(sl.step().unwrap(), StepOutcome::Solved { ticks: 3, .. }));
    assert_eq!(sl.stats().ticks_per_solve.mean(), Some(4.0));
}

#[test]
fn test_shipped_description_declares_configured_joints() {
    use mpc_common::config::load_bridge_config;
    use mpc_common::description::validate_joint_names;
    use std::path::Path;

    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
    let config = load_bridge_config(&root.join("config").join("bridge.toml")).unwrap();
    let description_path = config.robot.description_path.as_ref().unwrap();
    let text = std::fs::read_to_string(root.join(description_path)).unwrap();
    validate_joint_names(&text, &config.robot.joint_names).unwrap();
}
