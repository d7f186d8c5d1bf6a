//! Controller dispatch tests: boot, connection lifecycle, reads, writes and
//! malformed peer events.

mod common;

use common::*;
use light_indicator::ble::connection::Address;
use light_indicator::ble::controller::system_id;
use light_indicator::ble::events::ControllerEvent;
use light_indicator::ble::advertising::AdvertisingMode;
use light_indicator::ble::services::Characteristic;
use light_indicator::ble::subscription::ClientConfig;
use light_indicator::core::timer::TimerEvent;
use light_indicator::core::transport::{ATT_INVALID_ATTRIBUTE_LENGTH, ATT_SUCCESS, ATT_WRITE_NOT_PERMITTED};
use light_indicator::error::{Error, Violation};
use light_indicator::light::{LightSource, LightState, TriggerSource};
use light_indicator::FlowState;

#[test]
fn test_boot_stores_system_id_and_advertises() {
    let mut h = Harness::new();
    h.dispatch(ControllerEvent::Boot {
        identity_address: PEER_C,
    })
    .unwrap();

    assert_eq!(
        h.transport.calls,
        vec![
            Call::SystemId(system_id(&PEER_C)),
            Call::StartAdvertising(AdvertisingMode::Connectable)
        ]
    );
    assert_eq!(h.controller.next_deadline(), Some((at(1200), TimerEvent::PeriodicTick)));
    assert_eq!(h.controller.current_flow_state(), FlowState::Idle);
}

#[test]
fn test_connection_tracking() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();

    let connection = h.controller.registry().lookup(1).unwrap();
    assert_eq!(connection.peer_address, PEER_A);
    assert_eq!(h.controller.registry().count_in_use(), 1);

    h.disconnect(1).unwrap();
    assert!(h.controller.registry().lookup(1).is_none());
    assert_eq!(h.controller.registry().count_in_use(), 0);
}

#[test]
fn test_duplicate_connection_handle_rejected() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.transport.clear();

    assert_eq!(
        h.connect(1, PEER_B),
        Err(Error::ProtocolViolation(Violation::DuplicateConnection(1)))
    );
    assert_eq!(h.controller.registry().count_in_use(), 1);
    assert_eq!(h.controller.registry().lookup(1).unwrap().peer_address, PEER_A);
    assert!(h.transport.calls.is_empty());

    // a genuinely new peer still fits
    h.connect(2, PEER_B).unwrap();
    assert_eq!(h.controller.registry().count_in_use(), 2);
}

#[test]
fn test_disconnect_of_unknown_handle() {
    let mut h = Harness::booted();
    assert_eq!(
        h.disconnect(7),
        Err(Error::ProtocolViolation(Violation::UnknownConnection(7)))
    );
}

#[test]
fn test_subscriptions_cleared_with_last_link() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.connect(2, PEER_B).unwrap();
    h.subscribe(1, Characteristic::LightState, ClientConfig::Indicate).unwrap();

    h.disconnect(1).unwrap();
    assert_eq!(
        h.controller.subscriptions().mode_of(Characteristic::LightState),
        ClientConfig::Indicate
    );

    h.disconnect(2).unwrap();
    assert!(!h.controller.subscriptions().any_enabled());
}

#[test]
fn test_read_returns_current_value() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.light.set_state(TriggerSource::Wifi, PEER_B, LightState::On);
    h.transport.clear();

    for characteristic in Characteristic::ALL {
        h.dispatch(ControllerEvent::CharacteristicRead {
            handle: 1,
            attribute: HANDLES.attribute(characteristic),
        })
        .unwrap();
    }

    assert_eq!(
        h.transport.calls,
        vec![
            Call::ReadResponse {
                handle: 1,
                characteristic: Characteristic::LightState,
                data: vec![1]
            },
            Call::ReadResponse {
                handle: 1,
                characteristic: Characteristic::TriggerSource,
                data: vec![2]
            },
            Call::ReadResponse {
                handle: 1,
                characteristic: Characteristic::SourceAddress,
                data: PEER_B.bytes().to_vec()
            },
        ]
    );
}

#[test]
fn test_read_of_unknown_attribute() {
    let mut h = Harness::booted();
    let result = h.dispatch(ControllerEvent::CharacteristicRead {
        handle: 1,
        attribute: 0x0042,
    });
    assert_eq!(result, Err(Error::ProtocolViolation(Violation::UnknownCharacteristic(0x0042))));
    assert!(h.transport.calls.is_empty());
}

#[test]
fn test_write_sets_light_from_peer() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.transport.clear();

    h.write(1, Characteristic::LightState, &[0x01]).unwrap();
    assert_eq!(h.light.state(), LightState::On);
    assert_eq!(h.light.trigger_source(), TriggerSource::Bluetooth);
    assert_eq!(h.light.trigger_address(), PEER_A);
    assert_eq!(
        h.transport.calls,
        vec![Call::WriteResponse {
            handle: 1,
            attribute: HANDLES.light_state,
            status: ATT_SUCCESS
        }]
    );

    h.write(1, Characteristic::LightState, &[0x00]).unwrap();
    assert_eq!(h.light.state(), LightState::Off);
}

#[test]
fn test_write_from_untracked_link_has_unknown_address() {
    let mut h = Harness::booted();
    h.write(5, Characteristic::LightState, &[0xff]).unwrap();
    assert_eq!(h.light.state(), LightState::On);
    assert_eq!(h.light.trigger_address(), Address::UNKNOWN);
}

#[test]
fn test_empty_write_rejected() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.transport.clear();

    assert_eq!(
        h.write(1, Characteristic::LightState, &[]),
        Err(Error::ProtocolViolation(Violation::EmptyWrite))
    );
    assert_eq!(
        h.transport.calls,
        vec![Call::WriteResponse {
            handle: 1,
            attribute: HANDLES.light_state,
            status: ATT_INVALID_ATTRIBUTE_LENGTH
        }]
    );
    assert_eq!(h.light.state(), LightState::Off);
}

#[test]
fn test_write_to_read_only_characteristic() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();
    h.transport.clear();

    assert_eq!(
        h.write(1, Characteristic::TriggerSource, &[1]),
        Err(Error::ProtocolViolation(Violation::WriteNotPermitted(HANDLES.trigger_source)))
    );
    assert_eq!(
        h.transport.calls,
        vec![Call::WriteResponse {
            handle: 1,
            attribute: HANDLES.trigger_source,
            status: ATT_WRITE_NOT_PERMITTED
        }]
    );
    assert_eq!(h.light.trigger_source(), TriggerSource::Button);
}

#[test]
fn test_invalid_client_config_rejected() {
    let mut h = Harness::booted();
    h.connect(1, PEER_A).unwrap();

    assert_eq!(
        h.client_config(1, Characteristic::LightState, 0x0003),
        Err(Error::ProtocolViolation(Violation::InvalidClientConfig(0x0003)))
    );
    assert_eq!(
        h.controller.subscriptions().mode_of(Characteristic::LightState),
        ClientConfig::Disabled
    );
}

#[test]
fn test_unknown_status_flags_rejected() {
    let mut h = Harness::booted();
    let result = h.dispatch(ControllerEvent::CharacteristicStatus {
        handle: 1,
        attribute: HANDLES.light_state,
        status_flags: 0x04,
        client_config: 0,
    });
    assert_eq!(result, Err(Error::ProtocolViolation(Violation::UnknownStatusFlags(0x04))));
}

#[test]
fn test_data_change_refreshes_attribute_table() {
    let mut h = Harness::booted();
    h.change_light(LightState::On).unwrap();

    let updated: Vec<Characteristic> = h
        .transport
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::UpdateValue { characteristic, .. } => Some(*characteristic),
            _ => None,
        })
        .collect();
    assert_eq!(updated, Characteristic::ALL.to_vec());
}
