#![no_std]
#![no_main]

mod common;

use embassy_time::Duration;
use parklett_sensor_firmware::ble::conn_params::{ConnParamsNegotiator, NegotiationState};
use parklett_sensor_firmware::ble::events::{AppEvent, BleEvent};
use parklett_sensor_firmware::core::config::{ConnParams, ConnParamsConfig};
use parklett_sensor_firmware::core::hal::HciReason;

#[defmt_test::tests]
mod tests {
    use defmt::{assert, assert_eq};

    use super::*;
    use crate::common::*;

    #[init]
    fn init() {
        ensure_heap_initialized();
    }

    #[test]
    fn test_preferred_params_are_acceptable() {
        let negotiator = ConnParamsNegotiator::new(ConnParamsConfig::default());
        assert!(negotiator.is_acceptable(&ConnParams::PREFERRED));
        // 20 ms and 75 ms interval edges
        let mut params = ConnParams::PREFERRED;
        params.max_conn_interval = 16;
        assert!(negotiator.is_acceptable(&params));
        params.max_conn_interval = 60;
        assert!(negotiator.is_acceptable(&params));
    }

    #[test]
    fn test_out_of_window_params_are_not_acceptable() {
        let negotiator = ConnParamsNegotiator::new(ConnParamsConfig::default());
        assert!(!negotiator.is_acceptable(&slow_params()));
        let mut params = ConnParams::PREFERRED;
        params.slave_latency = 4;
        assert!(!negotiator.is_acceptable(&params));
        let mut params = ConnParams::PREFERRED;
        params.conn_sup_timeout = 600;
        assert!(!negotiator.is_acceptable(&params));
    }

    #[test]
    fn test_acceptable_connection_needs_no_negotiation() {
        let mut app = booted_app();
        app.on_ble_event(&connected(TEST_HANDLE)).unwrap();

        assert_eq!(app.conn_params().state(), NegotiationState::Done);
        assert_eq!(app.context().stack.timer, None);
        assert_eq!(app.context().stack.conn_params_requests(), 0);
    }

    #[test]
    fn test_first_request_after_first_delay() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();

        assert_eq!(app.context().stack.timer, Some(Duration::from_secs(5)));
        assert_eq!(app.context().stack.conn_params_requests(), 0);

        app.on_conn_params_timeout().unwrap();
        assert_eq!(app.context().stack.conn_params_requests(), 1);
        assert_eq!(app.context().stack.timer, Some(Duration::from_secs(30)));
        assert_eq!(
            app.conn_params().state(),
            NegotiationState::Pending {
                conn_handle: TEST_HANDLE,
                attempts: 1
            }
        );
    }

    #[test]
    fn test_accepted_update_completes_negotiation() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        app.on_conn_params_timeout().unwrap();
        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: ConnParams::PREFERRED,
        })
        .unwrap();

        assert_eq!(app.conn_params().state(), NegotiationState::Done);
        assert_eq!(app.context().stack.timer, None);
        assert!(app.context().stack.disconnects().is_empty());
    }

    #[test]
    fn test_gives_up_after_max_attempts_and_disconnects() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        for _ in 0..3 {
            app.on_conn_params_timeout().unwrap();
        }
        assert_eq!(app.context().stack.conn_params_requests(), 3);
        assert!(app.context().stack.disconnects().is_empty());

        app.on_conn_params_timeout().unwrap();
        assert_eq!(app.context().stack.conn_params_requests(), 3);
        assert_eq!(
            app.context().stack.disconnects().as_slice(),
            &[(TEST_HANDLE, HciReason::ConnIntervalUnacceptable)]
        );
        assert_eq!(app.conn_params().state(), NegotiationState::Done);
    }

    #[test]
    fn test_rejected_update_rearms_timer() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        app.on_conn_params_timeout().unwrap();
        app.context_mut().stack.timer = None;

        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: slow_params(),
        })
        .unwrap();
        assert_eq!(app.context().stack.timer, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_central_renegotiation_after_success_rearms() {
        let mut app = booted_app();
        app.on_ble_event(&connected(TEST_HANDLE)).unwrap();
        assert_eq!(app.conn_params().state(), NegotiationState::Done);

        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: slow_params(),
        })
        .unwrap();
        assert_eq!(
            app.conn_params().state(),
            NegotiationState::Pending {
                conn_handle: TEST_HANDLE,
                attempts: 0
            }
        );
        assert_eq!(app.context().stack.timer, Some(Duration::from_secs(5)));

        app.on_conn_params_timeout().unwrap();
        assert_eq!(app.context().stack.conn_params_requests(), 1);
    }

    #[test]
    fn test_renegotiation_keeps_attempt_count() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        app.on_conn_params_timeout().unwrap();
        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: ConnParams::PREFERRED,
        })
        .unwrap();
        assert_eq!(app.conn_params().state(), NegotiationState::Done);

        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: slow_params(),
        })
        .unwrap();
        assert_eq!(
            app.conn_params().state(),
            NegotiationState::Pending {
                conn_handle: TEST_HANDLE,
                attempts: 1
            }
        );
        assert_eq!(app.context().stack.timer, Some(Duration::from_secs(30)));

        // Two requests left before giving up
        for _ in 0..2 {
            app.on_conn_params_timeout().unwrap();
        }
        assert_eq!(app.context().stack.conn_params_requests(), 3);
        app.on_conn_params_timeout().unwrap();
        assert_eq!(app.context().stack.disconnects().len(), 1);
    }

    #[test]
    fn test_update_after_giving_up_is_ignored() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        for _ in 0..4 {
            app.on_conn_params_timeout().unwrap();
        }
        assert_eq!(app.context().stack.disconnects().len(), 1);

        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE,
            params: slow_params(),
        })
        .unwrap();
        assert_eq!(app.context().stack.disconnects().len(), 1);
        assert_eq!(app.conn_params().state(), NegotiationState::Done);
    }

    #[test]
    fn test_update_for_other_link_is_ignored() {
        let mut app = booted_app();
        app.on_ble_event(&connected(TEST_HANDLE)).unwrap();
        app.on_ble_event(&BleEvent::ConnParamsUpdated {
            conn_handle: TEST_HANDLE + 1,
            params: slow_params(),
        })
        .unwrap();
        assert_eq!(app.conn_params().state(), NegotiationState::Done);
        assert_eq!(app.context().stack.timer, None);
    }

    #[test]
    fn test_timeout_on_closing_link_is_skipped() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        app.context_mut().stack.link_closed = true;

        assert!(app.handle(AppEvent::ConnParamsTimeout).is_ok());
        assert_eq!(app.context().stack.conn_params_requests(), 0);
        assert!(app.context().stack.disconnects().is_empty());

        app.on_ble_event(&disconnected(TEST_HANDLE)).unwrap();
        assert_eq!(app.conn_params().state(), NegotiationState::Idle);
    }

    #[test]
    fn test_disconnect_cancels_negotiation() {
        let mut app = booted_app();
        app.on_ble_event(&connected_with(TEST_HANDLE, slow_params())).unwrap();
        app.on_ble_event(&disconnected(TEST_HANDLE)).unwrap();

        assert_eq!(app.conn_params().state(), NegotiationState::Idle);
        assert_eq!(app.context().stack.timer, None);

        // A timeout racing the disconnect is ignored
        app.on_conn_params_timeout().unwrap();
        assert_eq!(app.context().stack.conn_params_requests(), 0);
    }
}
