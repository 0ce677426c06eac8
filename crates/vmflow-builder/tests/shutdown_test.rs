mod common;

use common::{Behaviour, Call, FakeExecutor, FakeGateway, Reply, context};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vmflow_api::{PowerAction, VmKey, VmSpec};
use vmflow_builder::steps::{ShutdownCoordinator, SimpleShutdownStep};
use vmflow_builder::{
    BuildContext, BuildError, BuildState, CommandExecutor, ShutdownState, Step,
};

const SHUTDOWN: &str = "sudo shutdown -P now";

async fn state_with_session(executor: &FakeExecutor) -> BuildState {
    let mut state = BuildState::new();
    state.vm_key = Some(VmKey::new("vm-1"));
    state.session = Some(executor.connect("10.0.0.5").await.unwrap());
    state
}

fn shutdown_context(gateway: &Arc<FakeGateway>, executor: &FakeExecutor) -> BuildContext {
    context(gateway, VmSpec::new("web"))
        .with_executor(Arc::new(executor.clone()))
        .with_shutdown_command(Some(SHUTDOWN.to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_graceful_path_drains_then_verifies() {
    let mut fake = FakeGateway::new();
    fake.running_default = false;
    let gateway = Arc::new(fake);
    let executor = FakeExecutor::new();
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = state_with_session(&executor).await;

    let started = Instant::now();
    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(executor.started(), vec![SHUTDOWN]);
    assert_eq!(gateway.count(&Call::Power(PowerAction::Kill)), 0);

    let report = state.shutdown.unwrap();
    assert_eq!(
        report.transitions,
        vec![
            ShutdownState::Idle,
            ShutdownState::CommandIssued,
            ShutdownState::CommandSucceeded,
            ShutdownState::Draining,
            ShutdownState::Verified,
        ]
    );
    assert_eq!(report.still_running, Some(false));
    assert!(state.warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_nonzero_exit_forces_power_off() {
    let gateway = Arc::new(FakeGateway::new().with_running(vec![Reply::Fail(500)]));
    let executor = FakeExecutor::new().script(SHUTDOWN, Behaviour::Exit(1));
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = state_with_session(&executor).await;

    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    assert_eq!(gateway.count(&Call::Power(PowerAction::Kill)), 1);
    let report = state.shutdown.unwrap();
    assert_eq!(report.state(), ShutdownState::Verified);
    assert!(report.transitions.contains(&ShutdownState::CommandFailed));
    assert!(report.was_forced());
    assert_eq!(report.still_running, None);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_command_times_out() {
    let mut fake = FakeGateway::new();
    fake.running_default = false;
    let gateway = Arc::new(fake);
    let executor = FakeExecutor::new().script(SHUTDOWN, Behaviour::Hang);
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = state_with_session(&executor).await;

    let started = Instant::now();
    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(30));
    let report = state.shutdown.unwrap();
    assert!(report.transitions.contains(&ShutdownState::Timeout));
    assert_eq!(gateway.count(&Call::Power(PowerAction::Kill)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_issue_failure_goes_straight_to_forced_off() {
    let gateway = Arc::new(FakeGateway::new());
    let executor = FakeExecutor::new().script(SHUTDOWN, Behaviour::StartFails);
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = state_with_session(&executor).await;

    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    let report = state.shutdown.unwrap();
    assert_eq!(
        report.transitions,
        vec![
            ShutdownState::Idle,
            ShutdownState::IssueFailed,
            ShutdownState::ForcedOff,
            ShutdownState::Verified,
        ]
    );
    // Default fake still reports running after the kill
    assert_eq!(report.still_running, Some(true));
    assert_eq!(state.warnings.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_kill_is_only_a_warning() {
    let mut fake = FakeGateway::new();
    fake.fail_kill = true;
    fake.running_default = false;
    let gateway = Arc::new(fake);
    let executor = FakeExecutor::new();
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = BuildState::new();
    state.vm_key = Some(VmKey::new("vm-1"));

    // No session: the command cannot be issued at all
    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    assert_eq!(gateway.count(&Call::Power(PowerAction::Kill)), 1);
    assert_eq!(state.shutdown.unwrap().state(), ShutdownState::Verified);
    assert!(state.warnings[0].contains("forced power-off"));
}

#[tokio::test(start_paused = true)]
async fn test_no_command_skips_shutdown() {
    let gateway = Arc::new(FakeGateway::new());
    let ctx = context(&gateway, VmSpec::new("web")).with_shutdown_command(None);
    let mut state = BuildState::new();
    state.vm_key = Some(VmKey::new("vm-1"));

    ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

    assert_eq!(state.shutdown.unwrap().state(), ShutdownState::SkippedByConfig);
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_drain() {
    let gateway = Arc::new(FakeGateway::new());
    let executor = FakeExecutor::new();
    let ctx = shutdown_context(&gateway, &executor);
    let mut state = state_with_session(&executor).await;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let err = ShutdownCoordinator.run(&ctx, &mut state).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::Cancelled {
            step: ShutdownCoordinator::NAME
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_every_path_ends_verified() {
    let behaviours = [
        Behaviour::StartFails,
        Behaviour::Exit(0),
        Behaviour::Exit(1),
        Behaviour::WaitFails,
        Behaviour::Hang,
    ];

    for behaviour in behaviours {
        for running_after in [true, false] {
            for kill_fails in [true, false] {
                let mut fake = FakeGateway::new();
                fake.running_default = running_after;
                fake.fail_kill = kill_fails;
                let gateway = Arc::new(fake);
                let executor = FakeExecutor::new().script(SHUTDOWN, behaviour);
                let ctx = shutdown_context(&gateway, &executor);
                let mut state = state_with_session(&executor).await;

                ShutdownCoordinator.run(&ctx, &mut state).await.unwrap();

                let report = state.shutdown.unwrap();
                assert_eq!(
                    report.state(),
                    ShutdownState::Verified,
                    "{:?} running={} kill_fails={}",
                    behaviour,
                    running_after,
                    kill_fails
                );
                let forced = behaviour != Behaviour::Exit(0);
                assert_eq!(report.was_forced(), forced);
                assert_eq!(
                    gateway.count(&Call::Power(PowerAction::Kill)),
                    usize::from(forced)
                );
                assert_eq!(report.still_running, Some(running_after));
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_simple_shutdown_kills_through_api() {
    let mut fake = FakeGateway::new();
    fake.running_default = false;
    let gateway = Arc::new(fake);
    let ctx = context(&gateway, VmSpec::new("web"));
    let mut state = BuildState::new();
    state.vm_key = Some(VmKey::new("vm-1"));

    SimpleShutdownStep.run(&ctx, &mut state).await.unwrap();

    assert_eq!(
        gateway.calls(),
        vec![Call::Power(PowerAction::Kill), Call::IsRunning]
    );
    let report = state.shutdown.unwrap();
    assert_eq!(report.state(), ShutdownState::Verified);
    assert!(report.was_forced());
}
