use assertables::assert_contains;
use cosim_node::{common::ObjectValue, Error};
use integration_tests::sim_device::SimDevice;

mod utils;
use utils::init_logging;

#[test]
fn test_speed_round_trip() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("Speed", 0x2000, 0x01, ObjectType.UINT32)
        objects.Speed = 1500
        speed = objects.Speed
        "#,
    );
    assert_eq!(1500, device.global::<i64>("speed"));
    assert_eq!(1500, device.external_read_u32(0x2000, 1));
    assert_eq!(ObjectValue::U32(1500), device.bridge.read("Speed").unwrap());
}

#[test]
fn test_every_type_round_trips_its_limits() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("S8", 0x2100, 1, ObjectType.INT8)
        Register("S16", 0x2100, 2, ObjectType.INT16)
        Register("S32", 0x2100, 3, ObjectType.INT32)
        Register("S64", 0x2100, 4, ObjectType.INT64)
        Register("U8", 0x2100, 5, ObjectType.UINT8)
        Register("U16", 0x2100, 6, ObjectType.UINT16)
        Register("U32", 0x2100, 7, ObjectType.UINT32)
        Register("U64", 0x2100, 8, ObjectType.UINT64)

        function check(name, value)
            objects[name] = value
            assert(objects[name] == value, name .. " read back " .. tostring(objects[name]))
        end

        check("S8", -128)    check("S8", 127)
        check("S16", -32768) check("S16", 32767)
        check("S32", -2147483648) check("S32", 2147483647)
        check("S64", math.mininteger) check("S64", math.maxinteger)
        check("U8", 0)       check("U8", 255)
        check("U16", 0)      check("U16", 65535)
        check("U32", 0)      check("U32", 0xFFFFFFFF)
        check("U64", 0)      check("U64", math.maxinteger)
        "#,
    );

    assert_eq!(ObjectValue::I32(i32::MIN), device.bridge.read("S32").unwrap());
    assert_eq!(ObjectValue::U64(i64::MAX as u64), device.bridge.read("U64").unwrap());
    assert_eq!(vec![0xFF, 0xFF, 0xFF, 0xFF], device.external_read(0x2100, 7));
    assert_eq!(
        i64::MIN.to_le_bytes().to_vec(),
        device.external_read(0x2100, 4)
    );
}

#[test]
fn test_unregistered_name() {
    init_logging();
    let device = SimDevice::new("");
    assert!(matches!(
        device.bridge.read("Speed"),
        Err(Error::NameNotFound { .. })
    ));

    let err = device.exec("objects.Speed = 1").unwrap_err();
    assert_contains!(err.to_string(), "No object registered with name 'Speed'");
    let err = device.exec("local x = objects.Speed").unwrap_err();
    assert_contains!(err.to_string(), "No object registered with name 'Speed'");
}

#[test]
fn test_reregister_replaces_binding() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("Value", 0x2000, 1, ObjectType.UINT32)
        objects.Value = 77
        Register("Value", 0x2000, 3, ObjectType.INT16)
        objects.Value = -5
        "#,
    );
    assert_eq!(77, device.external_read_u32(0x2000, 1));
    assert_eq!((-5i16).to_le_bytes().to_vec(), device.external_read(0x2000, 3));
    assert_eq!(
        Some((
            cosim_node::common::ObjectId::new(0x2000, 3),
            cosim_node::common::ObjectType::Int16
        )),
        device.bridge.registry().binding("Value")
    );
}

#[test]
fn test_conversion_errors() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("Torque", 0x2000, 3, ObjectType.INT16)
        Register("Speed", 0x2000, 1, ObjectType.UINT32)
        "#,
    );

    let err = device.exec("objects.Torque = 40000").unwrap_err();
    assert_contains!(err.to_string(), "Cannot convert 40000 to INT16");
    let err = device.exec("objects.Speed = -1").unwrap_err();
    assert_contains!(err.to_string(), "Cannot convert -1 to UINT32");
    let err = device.exec("objects.Speed = 2.5").unwrap_err();
    assert_contains!(err.to_string(), "Cannot convert 2.5 to UINT32");
    let err = device.exec("objects.Speed = {}").unwrap_err();
    assert_contains!(err.to_string(), "Cannot convert a value of type table to UINT32");

    // Integral floats and numeric strings are accepted, like Lua arithmetic would
    device.exec("objects.Speed = 12.0").unwrap();
    assert_eq!(12, device.external_read_u32(0x2000, 1));
    device.exec("objects.Speed = '0x20'").unwrap();
    assert_eq!(32, device.external_read_u32(0x2000, 1));
}

#[test]
fn test_stack_rejections_reach_the_script() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("WrongType", 0x2000, 1, ObjectType.UINT16)
        Register("Missing", 0x3000, 0, ObjectType.UINT8)
        Register("Command", 0x2002, 0, ObjectType.UINT16)
        Register("DeviceType", 0x1000, 0, ObjectType.UINT32)
        "#,
    );

    let err = device.exec("local x = objects.WrongType").unwrap_err();
    assert_contains!(err.to_string(), "DataTypeMismatch");
    let err = device.exec("objects.Missing = 1").unwrap_err();
    assert_contains!(err.to_string(), "NoSuchObject");
    let err = device.exec("local x = objects.Command").unwrap_err();
    assert_contains!(err.to_string(), "WriteOnly");
    let err = device.exec("objects.DeviceType = 1").unwrap_err();
    assert_contains!(err.to_string(), "ReadOnly");

    // The script itself may write to objects which are read-only on the network
    device
        .exec("Register('Status', 0x2001, 0, ObjectType.UINT8) objects.Status = 3")
        .unwrap();
    assert_eq!(vec![3], device.external_read(0x2001, 0));
}

#[test]
fn test_standard_objects() {
    init_logging();
    let device = SimDevice::new(
        r#"
        Register("VendorId", 0x1018, 1, ObjectType.UINT32)
        Register("DeviceType", 0x1000, 0, ObjectType.UINT32)
        vendor = objects.VendorId
        device_type = objects.DeviceType
        "#,
    );
    assert_eq!(0xCAFE, device.global::<i64>("vendor"));
    assert_eq!(0x00020192, device.global::<i64>("device_type"));
}
