use std::time::Duration;

use assertables::assert_contains;
use cosim_node::{common::ObjectId, NmtState, ScriptConfig, WritePolicy};
use integration_tests::sim_device::SimDevice;

mod utils;
use utils::{init_logging, COUNTING_HOOKS};

#[test]
fn test_init_runs_once() {
    init_logging();
    let device = SimDevice::new(COUNTING_HOOKS);
    assert_eq!(0, device.global::<i64>("init_count"));
    device.init().unwrap();
    device.init().unwrap();
    assert_eq!(1, device.global::<i64>("init_count"));
    assert_eq!(NmtState::Operational, device.stack.nmt_state());
}

#[test]
fn test_sync_passes_counter() {
    init_logging();
    let device = SimDevice::new(COUNTING_HOOKS);
    device.init().unwrap();
    device.stack.sync(3).unwrap();
    device.stack.sync(4).unwrap();
    assert_eq!(vec![3, 4], device.global::<Vec<i64>>("sync_counts"));
}

#[test]
fn test_sync_producer_drives_on_sync() {
    init_logging();
    let device = SimDevice::new(COUNTING_HOOKS);
    device.init().unwrap();
    device
        .stack
        .start_sync_producer(Duration::from_millis(10));
    device.advance_ms(50).unwrap();
    assert_eq!(vec![1, 2, 3, 4, 5], device.global::<Vec<i64>>("sync_counts"));
}

#[test]
fn test_undefined_hooks_are_ignored() {
    init_logging();
    let device = SimDevice::new("");
    device.init().unwrap();
    device.stack.sync(1).unwrap();
    device.exec("ConfigureTimer(10)").unwrap();
    assert_eq!(1, device.advance_ms(10).unwrap());
}

#[test]
fn test_hook_errors_propagate() {
    init_logging();
    let device = SimDevice::new(r#"function OnSync(count) error("bad sync " .. count) end"#);
    device.init().unwrap();
    let err = device.stack.sync(9).unwrap_err();
    assert_contains!(err.to_string(), "bad sync 9");
}

#[test]
fn test_no_hooks_after_shutdown() {
    init_logging();
    let device = SimDevice::new(
        &[
            COUNTING_HOOKS,
            r#"
            callback_runs = 0
            ObjectCallback(0x2000, 1, function() callback_runs = callback_runs + 1 end)
            "#,
        ]
        .concat(),
    );
    device.bridge.shutdown();
    assert!(device.bridge.is_shut_down());

    device.init().unwrap();
    device.stack.sync(1).unwrap();
    device
        .external_write(0x2000, 1, &1u32.to_le_bytes())
        .unwrap();

    assert_eq!(0, device.global::<i64>("init_count"));
    assert!(device.global::<Vec<i64>>("sync_counts").is_empty());
    assert_eq!(0, device.global::<i64>("callback_runs"));
    // Writes are still stored
    assert_eq!(1, device.external_read_u32(0x2000, 1));
}

#[test]
fn test_emcy_forwards_to_stack() {
    init_logging();
    let device = SimDevice::new("");
    device.advance_ms(20).unwrap();
    device.exec("Emcy(0x1000, 0x01)").unwrap();

    let emcys = device.stack.emergencies();
    assert_eq!(1, emcys.len());
    assert_eq!(0x1000, emcys[0].code);
    assert_eq!(0x01, emcys[0].register);
    assert!(emcys[0].vendor_data.is_empty());
    assert_eq!(Duration::from_millis(20), emcys[0].timestamp);
    assert_eq!(vec![0x01], device.external_read(0x1001, 0));

    let err = device.exec("Emcy(0x10000, 0)").unwrap_err();
    assert_contains!(err.to_string(), "Emcy: code 65536 is out of range");
    assert_eq!(1, device.stack.emergencies().len());
}

#[test]
fn test_configure_heartbeat() {
    init_logging();
    let device = SimDevice::new(
        r#"
        heartbeat_writes = 0
        ObjectCallback(0x1017, 0, function() heartbeat_writes = heartbeat_writes + 1 end)
        function OnInit() ConfigureHeartbeat(100) end
        "#,
    );
    device.init().unwrap();
    assert_eq!(100u16.to_le_bytes().to_vec(), device.external_read(0x1017, 0));
    // Stack configuration writes bypass the write callbacks
    assert_eq!(0, device.global::<i64>("heartbeat_writes"));

    device.advance_ms(1000).unwrap();
    assert_eq!(10, device.stack.heartbeat_count());

    device.exec("ConfigureHeartbeat(0)").unwrap();
    device.advance_ms(1000).unwrap();
    assert_eq!(10, device.stack.heartbeat_count());

    let err = device.exec("ConfigureHeartbeat(70000)").unwrap_err();
    assert_contains!(err.to_string(), "out of range");
}

#[test]
fn test_network_heartbeat_write_runs_callback() {
    init_logging();
    let device = SimDevice::new(
        r#"
        heartbeat_writes = 0
        ObjectCallback(0x1017, 0, function() heartbeat_writes = heartbeat_writes + 1 end)
        "#,
    );
    device.init().unwrap();
    device
        .external_write(0x1017, 0, &50u16.to_le_bytes())
        .unwrap();
    assert_eq!(1, device.global::<i64>("heartbeat_writes"));
    device.advance_ms(100).unwrap();
    assert_eq!(2, device.stack.heartbeat_count());
}

#[test]
fn test_require_from_lib_path() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("cosim-lib-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("drive_helpers.lua"),
        "return { double = function(x) return x * 2 end }",
    )
    .unwrap();

    let config = ScriptConfig {
        lib_path: Some(format!("{}/?.lua", dir.display())),
    };
    let device = SimDevice::try_new(
        r#"
        local helpers = require("drive_helpers")
        Register("Speed", 0x2000, 1, ObjectType.UINT32)
        objects.Speed = helpers.double(21)
        "#,
        WritePolicy::PerObject,
        &config,
    )
    .unwrap();
    assert_eq!(42, device.external_read_u32(0x2000, 1));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_separate_devices_are_independent() {
    init_logging();
    let script = r#"
        Register("Speed", 0x2000, 1, ObjectType.UINT32)
        function OnTick() objects.Speed = objects.Speed + 1 end
    "#;
    let a = SimDevice::new(script);
    let b = SimDevice::new(script);
    a.exec("ConfigureTimer(10)").unwrap();
    b.exec("ConfigureTimer(20)").unwrap();
    a.advance_ms(100).unwrap();
    b.advance_ms(100).unwrap();
    assert_eq!(10, a.external_read_u32(0x2000, 1));
    assert_eq!(5, b.external_read_u32(0x2000, 1));
    assert!(!b.bridge.registry().contains("Position"));
    assert_eq!(
        Some((ObjectId::new(0x2000, 1), cosim_node::common::ObjectType::UInt32)),
        a.bridge.registry().binding("Speed")
    );
}
