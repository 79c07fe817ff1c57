use assertables::assert_contains;
use cosim_node::{scheduler::TimerState, ErrorPolicy};
use integration_tests::sim_device::SimDevice;

mod utils;
use utils::{init_logging, COUNTING_HOOKS};

#[test]
fn test_timer_ticks_each_period() {
    init_logging();
    let device = SimDevice::new(COUNTING_HOOKS);
    device.exec("ConfigureTimer(100)").unwrap();

    device.advance_ms(99).unwrap();
    assert_eq!(0, device.global::<i64>("tick_count"));
    device.advance_ms(1).unwrap();
    assert_eq!(1, device.global::<i64>("tick_count"));
    device.advance_ms(200).unwrap();
    assert_eq!(3, device.global::<i64>("tick_count"));
}

#[test]
fn test_timer_configured_from_init() {
    init_logging();
    let device = SimDevice::new(
        r#"
        ticks = 0
        function OnInit() ConfigureTimer(50) end
        function OnTick() ticks = ticks + 1 end
        "#,
    );
    device.advance_ms(500).unwrap();
    assert_eq!(0, device.global::<i64>("ticks"));

    device.init().unwrap();
    device.advance_ms(500).unwrap();
    assert_eq!(10, device.global::<i64>("ticks"));
}

#[test]
fn test_reconfigure_applies_next_period() {
    init_logging();
    let device = SimDevice::new(
        r#"
        ticks = {}
        function OnTick()
            table.insert(ticks, true)
            if #ticks == 1 then ConfigureTimer(10) end
        end
        ConfigureTimer(100)
        "#,
    );
    // First tick at 100ms, then every 10ms
    device.advance_ms(100).unwrap();
    assert_eq!(1, device.global::<Vec<bool>>("ticks").len());
    device.advance_ms(30).unwrap();
    assert_eq!(4, device.global::<Vec<bool>>("ticks").len());
    assert_eq!(1, device.stack.event_loop().pending());
}

#[test]
fn test_shutdown_drains_outstanding_tick() {
    init_logging();
    let device = SimDevice::new(COUNTING_HOOKS);
    device.exec("ConfigureTimer(100)").unwrap();
    device.advance_ms(250).unwrap();
    assert_eq!(2, device.global::<i64>("tick_count"));

    device.bridge.shutdown();
    device.advance_ms(1000).unwrap();
    // The wait submitted before shutdown fires once more, then the timer stops
    assert_eq!(3, device.global::<i64>("tick_count"));
    assert_eq!(TimerState::Idle, device.bridge.timer().state());
    assert_eq!(0, device.stack.event_loop().pending());

    device.exec("ConfigureTimer(100)").unwrap();
    assert_eq!(0, device.stack.event_loop().pending());
}

#[test]
fn test_zero_period_is_rejected() {
    init_logging();
    let device = SimDevice::new("");
    let err = device.exec("ConfigureTimer(0)").unwrap_err();
    assert_contains!(err.to_string(), "timer period must be at least 1 ms");
    let err = device.exec("ConfigureTimer(-5)").unwrap_err();
    assert_contains!(err.to_string(), "ConfigureTimer: period -5 is out of range");
    assert_eq!(None, device.bridge.timer().period());
}

#[test]
fn test_tick_error_stops_timer() {
    init_logging();
    let device = SimDevice::new(
        r#"
        function OnTick() error("tick failed") end
        ConfigureTimer(10)
        "#,
    );
    let err = device.advance_ms(100).unwrap_err();
    assert_contains!(err.to_string(), "tick failed");
    assert_eq!(TimerState::Idle, device.bridge.timer().state());
    assert_eq!(0, device.stack.event_loop().pending());
}

#[test]
fn test_tick_error_logged_with_keep_going() {
    init_logging();
    let device = SimDevice::new(
        r#"
        ticks = 0
        function OnTick()
            ticks = ticks + 1
            error("tick failed")
        end
        ConfigureTimer(10)
        "#,
    );
    device.stack.event_loop().set_error_policy(ErrorPolicy::Log);
    device.advance_ms(100).unwrap();
    assert_eq!(1, device.global::<i64>("ticks"));

    // The script can restart it
    device.exec("ConfigureTimer(10)").unwrap();
    device.advance_ms(10).unwrap();
    assert_eq!(2, device.global::<i64>("ticks"));
}
