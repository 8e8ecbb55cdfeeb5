#![no_std]
#![no_main]

mod common;

use parklett_sensor_firmware::ble::bonding::{BondTable, BOND_IMAGE_SIZE};
use parklett_sensor_firmware::ble::events::BleEvent;
use parklett_sensor_firmware::core::config::{FirmwareConfig, SecurityPolicy, MAX_BONDED_PEERS};
use parklett_sensor_firmware::core::error::BondError;
use proptest::prelude::*;

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
    fn test_default_security_policy() {
        let policy = SecurityPolicy::default();
        assert!(policy.bond);
        assert!(!policy.mitm);
        assert!(!policy.oob);
        assert_eq!(policy.min_key_size, 7);
        assert_eq!(policy.max_key_size, 16);
        assert!(policy.kdist_peripheral.enc && policy.kdist_peripheral.id);
        assert!(policy.kdist_central.enc && policy.kdist_central.id);
    }

    #[test]
    fn test_table_lookup_by_master_and_peer() {
        let mut table = BondTable::new();
        table.insert(test_bond(1));
        table.insert(test_bond(2));

        let bond = test_bond(2);
        assert_eq!(table.find_by_master(bond.ediv, &bond.rand), Some(&bond));
        assert_eq!(table.find_by_peer(&bond.peer_addr), Some(&bond));
        assert!(table.find_by_master(0xFFFF, &[0; 8]).is_none());
    }

    #[test]
    fn test_rebond_replaces_existing_peer() {
        let mut table = BondTable::new();
        table.insert(test_bond(1));
        let mut renewed = test_bond(1);
        renewed.ltk = [0xAA; 16];
        table.insert(renewed);

        assert_eq!(table.len(), 1);
        assert_eq!(table.find_by_peer(&renewed.peer_addr).unwrap().ltk, [0xAA; 16]);
    }

    #[test]
    fn test_full_table_evicts_oldest() {
        let mut table = BondTable::new();
        for seed in 0..=MAX_BONDED_PEERS as u8 {
            table.insert(test_bond(seed));
        }
        assert_eq!(table.len(), MAX_BONDED_PEERS);
        assert!(table.find_by_peer(&test_bond(0).peer_addr).is_none());
        assert!(table.find_by_peer(&test_bond(MAX_BONDED_PEERS as u8).peer_addr).is_some());
    }

    #[test]
    fn test_image_restores_table() {
        let mut table = BondTable::new();
        table.insert(test_bond(3));
        table.insert(test_bond(4));

        let mut buf = [0u8; BOND_IMAGE_SIZE];
        let image = table.encode(&mut buf).unwrap();
        let restored = BondTable::decode(image).unwrap();

        assert_eq!(restored.len(), 2);
        assert!(restored.iter().eq(table.iter()));
    }

    #[test]
    fn test_corrupt_image_is_rejected() {
        assert_eq!(BondTable::decode(&[0xFF, 0xFF, 0xFF]).err(), Some(BondError::Decode));
    }

    #[test]
    fn test_image_too_large_for_buffer() {
        let mut table = BondTable::new();
        table.insert(test_bond(1));
        let mut buf = [0u8; 8];
        assert_eq!(table.encode(&mut buf).err(), Some(BondError::Encode));
    }

    #[test]
    fn test_bonded_event_stores_keys() {
        let mut app = booted_app();
        app.on_ble_event(&connected(TEST_HANDLE)).unwrap();
        app.on_ble_event(&BleEvent::Bonded {
            conn_handle: TEST_HANDLE,
            record: test_bond(7),
        })
        .unwrap();

        assert_eq!(app.bonding().store().stored.as_slice(), &[test_bond(7)]);
        assert!(app.conn_state().is_bonded());
    }

    #[test]
    fn test_bonding_disabled_stores_nothing() {
        let mut config = FirmwareConfig::default();
        config.security.bond = false;
        let mut app = test_app(config, false);
        app.boot().unwrap();
        app.on_ble_event(&connected(TEST_HANDLE)).unwrap();
        app.on_ble_event(&BleEvent::Bonded {
            conn_handle: TEST_HANDLE,
            record: test_bond(7),
        })
        .unwrap();
        assert!(app.bonding().store().stored.is_empty());
    }

    #[test]
    fn test_erase_on_boot() {
        let mut config = FirmwareConfig::default();
        config.erase_bonds_on_boot = true;
        let mut app = test_app(config, false);
        app.boot().unwrap();
        assert_eq!(app.bonding().store().erases, 1);
    }

    #[test]
    fn test_no_erase_by_default() {
        let app = booted_app();
        assert_eq!(app.bonding().store().erases, 0);
    }

    proptest! {
        #[test]
        fn test_table_never_exceeds_capacity(seeds in prop::collection::vec(any::<u8>(), 0..12)) {
            let mut table = BondTable::new();
            for seed in seeds {
                table.insert(test_bond(seed));
                prop_assert!(table.len() <= MAX_BONDED_PEERS);
                prop_assert!(table.find_by_peer(&test_bond(seed).peer_addr).is_some());
            }
        }
    }
}
