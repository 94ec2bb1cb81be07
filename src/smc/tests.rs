use std::mem::{offset_of, size_of};

use super::mock::MockSmc;
use super::*;
use crate::utils::bindings::{IO_RETURN_BAD_ARGUMENT, SMC_RESULT_ERROR};

fn transport_returning(io_return: i32, smc_result: u8) -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_call_struct_method().returning(move |_, _, output| {
        output.result = smc_result;
        io_return
    });
    transport.expect_close().return_const(true);
    transport
}

fn chte() -> SmcKey {
    SmcKey::from_static("CHTE")
}

#[test]
fn test_param_struct_layout() {
    assert_eq!(size_of::<SMCParamStruct>(), 80);
    assert_eq!(offset_of!(SMCParamStruct, key), 0);
    assert_eq!(offset_of!(SMCParamStruct, vers), 4);
    assert_eq!(offset_of!(SMCParamStruct, p_limit_data), 12);
    assert_eq!(offset_of!(SMCParamStruct, key_info), 28);
    assert_eq!(offset_of!(SMCParamStruct, result), 40);
    assert_eq!(offset_of!(SMCParamStruct, status), 41);
    assert_eq!(offset_of!(SMCParamStruct, data8), 42);
    assert_eq!(offset_of!(SMCParamStruct, data32), 44);
    assert_eq!(offset_of!(SMCParamStruct, bytes), 48);
}

#[test]
fn test_success_returns_response() {
    let mut smc = Smc::with_transport(Box::new(transport_returning(0, 0)));
    let output = smc.call(&Command::ReadKey.request(chte())).unwrap();
    assert_eq!(output.result, 0);
}

#[test]
fn test_key_not_found_carries_key_name() {
    let mut smc = Smc::with_transport(Box::new(transport_returning(0, 132)));
    let err = smc.read_key(SmcKey::from_static("CH0B"), DataType::UINT8).unwrap_err();
    match err {
        Error::KeyNotFound { key } => assert_eq!(key, "CH0B"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_device_error_under_transport_success() {
    let mut smc = Smc::with_transport(Box::new(transport_returning(0, SMC_RESULT_ERROR)));
    let err = smc.read_key(chte(), DataType::UINT32).unwrap_err();
    assert!(matches!(err, Error::Unknown { io_return: 0, smc_result: 1 }));
}

#[test]
fn test_not_privileged_transport_code() {
    let mut smc = Smc::with_transport(Box::new(transport_returning(IO_RETURN_NOT_PRIVILEGED, 0)));
    let err = smc.write_key(chte(), DataType::UINT32, &[0u8; 32]).unwrap_err();
    assert!(matches!(err, Error::NotPrivileged));
}

#[test]
fn test_other_transport_failure_passes_code_through() {
    let mut smc = Smc::with_transport(Box::new(transport_returning(IO_RETURN_BAD_ARGUMENT, 7)));
    let err = smc.read_key(chte(), DataType::UINT32).unwrap_err();
    match err {
        Error::Unknown { io_return, smc_result } => {
            assert_eq!(io_return, IO_RETURN_BAD_ARGUMENT);
            assert_eq!(smc_result, 7);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_command_codes_stay_in_the_record() {
    assert_eq!(Command::ReadKey as u8, 5);
    assert_eq!(Command::WriteKey as u8, 6);
    assert_eq!(Command::GetKeyInfo as u8, 9);

    let input = Command::GetKeyInfo.request(chte());
    assert_eq!(input.key, chte().code());
    assert_eq!(input.data8, SMC_CMD_READ_KEYINFO);
}

#[test]
fn test_call_driver_uses_given_method_index() {
    let mut transport = MockTransport::new();
    transport
        .expect_call_struct_method()
        .withf(|method, input, _| *method == 7 && input.data8 == SMC_CMD_READ_BYTES)
        .times(1)
        .return_const(IO_RETURN_BAD_ARGUMENT);
    transport.expect_close().return_const(true);

    let mut smc = Smc::with_transport(Box::new(transport));
    let err = smc.call_driver(&Command::ReadKey.request(chte()), 7).unwrap_err();
    assert!(matches!(err, Error::Unknown { io_return: IO_RETURN_BAD_ARGUMENT, .. }));
}

#[test]
fn test_mock_rejects_unknown_method_index() {
    let mock = MockSmc::tahoe(false);
    let mut smc = mock.connect().unwrap();
    let request = Command::ReadKey.request(chte());

    assert!(smc.call_driver(&request, KERNEL_INDEX_SMC).is_ok());
    assert!(matches!(smc.call_driver(&request, Command::ReadKey as u32), Err(Error::Unknown { .. })));
}

#[test]
fn test_read_request_record() {
    let mut transport = MockTransport::new();
    transport
        .expect_call_struct_method()
        .withf(|method, input, _| {
            *method == KERNEL_INDEX_SMC
                && input.key == 0x4348_5445
                && input.data8 == SMC_CMD_READ_BYTES
                && input.key_info.data_size == 4
                && input.bytes == [0u8; 32]
        })
        .times(1)
        .returning(|_, _, output| {
            output.bytes[0] = 1;
            0
        });
    transport.expect_close().times(1).return_const(true);

    let mut smc = Smc::with_transport(Box::new(transport));
    let bytes = smc.read_key(chte(), DataType::UINT32).unwrap();
    assert_eq!(bytes[0], 1);
    assert!(smc.close());
}

#[test]
fn test_write_request_record() {
    let mut payload = [0u8; 32];
    payload[0] = 0x02;

    let mut transport = MockTransport::new();
    transport
        .expect_call_struct_method()
        .withf(move |_, input, _| {
            input.key == SmcKey::from_static("CH0B").code()
                && input.data8 == SMC_CMD_WRITE_BYTES
                && input.key_info.data_size == 1
                && input.bytes == payload
        })
        .times(1)
        .return_const(0);
    transport.expect_close().return_const(true);

    let mut smc = Smc::with_transport(Box::new(transport));
    smc.write_key(SmcKey::from_static("CH0B"), DataType::UINT8, &payload).unwrap();
}

#[test]
fn test_key_info_reports_driver_type() {
    let mock = MockSmc::tahoe(false);
    let mut smc = mock.connect().unwrap();
    let info = smc.key_info(chte()).unwrap();
    assert_eq!(info, DataType::UINT32);

    let err = smc.key_info(SmcKey::from_static("CH0B")).unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));
}

#[test]
fn test_round_trip_both_key_families() {
    let mock = MockSmc::tahoe(false).with_key("CH0B", DataType::UINT8, &[0]);
    let mut smc = mock.connect().unwrap();

    let mut payload = [0u8; 32];
    payload[0] = 0x01;
    smc.write_key(chte(), DataType::UINT32, &payload).unwrap();
    assert_eq!(&smc.read_key(chte(), DataType::UINT32).unwrap()[..4], &[1, 0, 0, 0]);

    payload[0] = 0x02;
    smc.write_key(SmcKey::from_static("CH0B"), DataType::UINT8, &payload).unwrap();
    assert_eq!(smc.read_key(SmcKey::from_static("CH0B"), DataType::UINT8).unwrap()[0], 0x02);

    assert_eq!(mock.value("CHTE"), Some(vec![1, 0, 0, 0]));
    assert_eq!(mock.value("CH0B"), Some(vec![2]));
}

#[test]
fn test_reads_need_no_privilege() {
    let mock = MockSmc::tahoe(true).unprivileged();
    let mut smc = mock.connect().unwrap();
    assert_eq!(smc.read_key(chte(), DataType::UINT32).unwrap()[0], 1);

    let err = smc.write_key(chte(), DataType::UINT32, &[0u8; 32]).unwrap_err();
    assert!(matches!(err, Error::NotPrivileged));
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn test_drop_closes_connection_once() {
    let mock = MockSmc::tahoe(false);
    {
        let _smc = mock.connect().unwrap();
    }
    assert_eq!(mock.open_count(), 1);
    assert_eq!(mock.close_count(), 1);

    let smc = mock.connect().unwrap();
    assert!(smc.close());
    assert_eq!(mock.close_count(), 2);
}

#[test]
fn test_close_failure_is_reported_not_raised() {
    let mut transport = MockTransport::new();
    transport.expect_close().times(1).return_const(false);
    let smc = Smc::with_transport(Box::new(transport));
    assert!(!smc.close());
}

#[test]
fn test_unavailable_driver() {
    let err = MockSmc::tahoe(false).unavailable().connect().unwrap_err();
    assert!(matches!(err, Error::DriverNotFound));
}

#[cfg(not(target_os = "macos"))]
#[test]
fn test_open_without_iokit() {
    assert!(matches!(Smc::open(), Err(Error::DriverNotFound)));
    assert!(matches!(IOKitConnector.connect(), Err(Error::DriverNotFound)));
}
