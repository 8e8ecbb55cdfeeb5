//! Bond persistence and the SoftDevice security handler.
//!
//! The bond table lives in RAM behind a blocking mutex so the security
//! handler can serve LTK lookups synchronously. Writes are deferred to
//! [`bond_flush_task`], which stores the table's postcard image in a
//! sequential-storage map on the internal flash.

use core::cell::RefCell;
use core::ops::Range;

use defmt::{debug, error, info};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_storage_async::nor_flash::NorFlash;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{AddressType, Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode};
use nrf_softdevice::Flash;
use sequential_storage::cache::NoCache;

use parklett_sensor_firmware::ble::bonding::{BondRecord, BondTable, BOND_IMAGE_SIZE};
use parklett_sensor_firmware::ble::events::BleEvent;
use parklett_sensor_firmware::core::config::{IoCaps, SecurityPolicy, BOND_STORAGE_END, BOND_STORAGE_START};
use parklett_sensor_firmware::core::error::{BondError, OrFatal};
use parklett_sensor_firmware::core::hal::BondStore;

use super::post;

/// Map key of the bond table image.
const KEY_BOND_TABLE: u8 = 0x01;

const STORAGE_RANGE: Range<u32> = BOND_STORAGE_START..BOND_STORAGE_END;

/// Bond table shared with the security handler.
pub static BONDS: Mutex<CriticalSectionRawMutex, RefCell<BondTable>> = Mutex::new(RefCell::new(BondTable::new()));

#[derive(Clone, Copy, defmt::Format)]
enum FlushRequest {
    Store,
    Erase,
}

static FLUSH: Signal<CriticalSectionRawMutex, FlushRequest> = Signal::new();

/// [`BondStore`] backed by the shared table; flash writes happen later.
pub struct FlashBondStore;

impl BondStore for FlashBondStore {
    fn erase_all(&mut self) -> Result<(), BondError> {
        BONDS.lock(|table| table.borrow_mut().clear());
        FLUSH.signal(FlushRequest::Erase);
        Ok(())
    }

    fn store(&mut self, record: BondRecord) -> Result<(), BondError> {
        BONDS.lock(|table| table.borrow_mut().insert(record));
        FLUSH.signal(FlushRequest::Store);
        Ok(())
    }
}

/// Restore the bond table from flash. A missing image is an empty table.
pub async fn load_bonds(flash: &mut impl NorFlash) -> Result<(), BondError> {
    let mut buf = [0u8; 2 * BOND_IMAGE_SIZE];
    let stored = sequential_storage::map::fetch_item::<u8, &[u8], _>(
        flash,
        STORAGE_RANGE,
        &mut NoCache::new(),
        &mut buf,
        &KEY_BOND_TABLE,
    )
    .await
    .map_err(|e| {
        error!("BONDING: flash read error: {:?}", defmt::Debug2Format(&e));
        BondError::Storage
    })?;

    let table = match stored {
        Some(image) => BondTable::decode(image)?,
        None => BondTable::new(),
    };
    info!("BONDING: {} bonded peers restored", table.len());
    BONDS.lock(|cell| *cell.borrow_mut() = table);
    Ok(())
}

async fn save_bonds(flash: &mut impl NorFlash) -> Result<(), BondError> {
    let mut image_buf = [0u8; BOND_IMAGE_SIZE];
    let mut data_buf = [0u8; 2 * BOND_IMAGE_SIZE];
    let table = BONDS.lock(|cell| cell.borrow().clone());
    let image: &[u8] = table.encode(&mut image_buf)?;

    sequential_storage::map::store_item::<u8, &[u8], _>(
        flash,
        STORAGE_RANGE,
        &mut NoCache::new(),
        &mut data_buf,
        &KEY_BOND_TABLE,
        &image,
    )
    .await
    .map_err(|e| {
        error!("BONDING: flash write error: {:?}", defmt::Debug2Format(&e));
        BondError::Storage
    })?;
    debug!("BONDING: {} peers written to flash", table.len());
    Ok(())
}

async fn erase_bonds(flash: &mut impl NorFlash) -> Result<(), BondError> {
    sequential_storage::erase_all(flash, STORAGE_RANGE).await.map_err(|e| {
        error!("BONDING: flash erase error: {:?}", defmt::Debug2Format(&e));
        BondError::Storage
    })?;
    info!("BONDING: bond storage erased");
    Ok(())
}

#[embassy_executor::task]
pub async fn bond_flush_task(mut flash: Flash) -> ! {
    loop {
        let request = FLUSH.wait().await;
        debug!("BONDING: flush {}", request);
        match request {
            FlushRequest::Store => save_bonds(&mut flash).await,
            FlushRequest::Erase => erase_bonds(&mut flash).await,
        }
        .or_fatal();
    }
}

/// Security handler applying the boot-time [`SecurityPolicy`].
pub struct Bonder {
    policy: SecurityPolicy,
}

impl Bonder {
    pub const fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }
}

fn address_type_code(address_type: AddressType) -> u8 {
    match address_type {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        match self.policy.io_caps {
            IoCaps::None => IoCapabilities::None,
            IoCaps::DisplayOnly => IoCapabilities::DisplayOnly,
            IoCaps::KeyboardOnly => IoCapabilities::KeyboardOnly,
            IoCaps::DisplayYesNo => IoCapabilities::DisplayYesNo,
            IoCaps::KeyboardDisplay => IoCapabilities::KeyboardDisplay,
        }
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        self.policy.bond
    }

    fn on_bonded(&self, conn: &Connection, master_id: MasterId, key: EncryptionInfo, peer_id: IdentityKey) {
        let Some(conn_handle) = conn.handle() else {
            return;
        };
        let record = BondRecord {
            ediv: master_id.ediv,
            rand: master_id.rand,
            ltk: key.ltk,
            ltk_flags: key.flags,
            peer_addr: peer_id.addr.bytes(),
            peer_addr_type: address_type_code(peer_id.addr.address_type()),
        };
        post(BleEvent::Bonded { conn_handle, record });
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        BONDS.lock(|table| {
            table
                .borrow()
                .find_by_master(master_id.ediv, &master_id.rand)
                .map(|record| EncryptionInfo {
                    ltk: record.ltk,
                    flags: record.ltk_flags,
                })
        })
    }

    fn on_security_update(&self, conn: &Connection, mode: SecurityMode) {
        info!("BONDING: security mode {}", mode);
        if let Some(conn_handle) = conn.handle() {
            post(BleEvent::SecurityUpdated {
                conn_handle,
                encrypted: !matches!(mode, SecurityMode::NoAccess | SecurityMode::Open),
            });
        }
    }
}
