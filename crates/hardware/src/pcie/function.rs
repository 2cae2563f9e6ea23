//! One endpoint function: configuration space, BAR layout and negotiated identity.

use tracing::debug;

use super::bar::{BarKind, BarLayout};
use super::config_space::{ConfigSpace, HardwareIds};
use super::tlp::{CplStatus, Tlp, TlpType};
use crate::common::{HarnessError, HarnessResult, PcieId};

/// A PCIe function exposed by the device adapter.
///
/// The function learns its bus/device numbers from the configuration requests the root
/// complex sends it; until enumeration reaches it, `pcie_id` reports bus 0.
#[derive(Debug, Clone)]
pub struct PcieFunction {
    number: u8,
    pcie_id: PcieId,
    config: ConfigSpace,
    locked: bool,
}

impl PcieFunction {
    /// Creates function `number` with the given identity registers.
    pub fn new(number: u8, ids: HardwareIds, max_payload: usize) -> Self {
        Self {
            number,
            pcie_id: PcieId::new(0, 0, number),
            config: ConfigSpace::new(ids, max_payload),
            locked: false,
        }
    }

    /// Function number within the device.
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// Identity assigned by enumeration.
    pub const fn pcie_id(&self) -> PcieId {
        self.pcie_id
    }

    /// Read-only view of the configuration space.
    pub const fn config(&self) -> &ConfigSpace {
        &self.config
    }

    pub(crate) const fn config_mut(&mut self) -> &mut ConfigSpace {
        &mut self.config
    }

    /// Whether enumeration has captured the BAR layout.
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Declares BAR `index` as a 64-bit, non-prefetchable memory BAR of `size` bytes.
    ///
    /// # Returns
    ///
    /// `InvalidBarSize` for a size that is not a power of two of at least 16 bytes,
    /// `InvalidBarIndex` if the BAR (and its upper half) do not fit, and `BarLocked` once the
    /// root complex has started configuring the function.
    pub fn configure_bar(&mut self, index: usize, size: u64) -> HarnessResult<()> {
        self.configure_bar_with(index, size, BarKind::Memory64, false)
    }

    /// Declares BAR `index` with an explicit kind and prefetchability.
    pub fn configure_bar_with(
        &mut self,
        index: usize,
        size: u64,
        kind: BarKind,
        prefetchable: bool,
    ) -> HarnessResult<()> {
        if self.locked {
            return Err(HarnessError::BarLocked {
                id: self.pcie_id,
                index,
            });
        }
        let layout = BarLayout::new(index, size, kind, prefetchable)?;
        self.config.set_bar(index, layout);
        debug!(function = self.number, index, size, ?kind, "BAR configured");
        Ok(())
    }

    /// Services a Type 0 configuration request and returns its completion.
    pub(crate) fn handle_config(&mut self, tlp: &Tlp) -> Tlp {
        let hdr = &tlp.header;
        if self.pcie_id != hdr.completer_id {
            debug!(old = %self.pcie_id, new = %hdr.completer_id, "function identity captured");
            self.pcie_id = hdr.completer_id;
        }
        match hdr.tlp_type {
            TlpType::CfgWrite0 => {
                self.locked = true;
                self.config.write_u32(hdr.register, tlp.dword(), hdr.first_be);
                Tlp::completion(hdr, self.pcie_id, CplStatus::Success)
            }
            _ => {
                let value = self.config.read_u32(hdr.register);
                Tlp::completion_data(hdr, self.pcie_id, 0, &value.to_le_bytes(), 4)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::cfg;

    #[test]
    fn identity_follows_config_requests_and_locks_bars() {
        let mut f = PcieFunction::new(0, HardwareIds::default(), 256);
        f.configure_bar(0, 1 << 20).unwrap();
        let me = PcieId::new(3, 0, 0);
        let rd = Tlp::cfg_read(PcieId::default(), me, 1, cfg::ID);
        let _ = f.handle_config(&rd);
        assert_eq!(f.pcie_id(), me);
        assert!(!f.is_locked());

        let wr = Tlp::cfg_write(PcieId::default(), me, 2, cfg::BAR0, 0xFFFF_FFFF, 0xF);
        let cpl = f.handle_config(&wr);
        assert_eq!(cpl.header.tlp_type, TlpType::Cpl);
        assert!(f.is_locked());
        assert_eq!(
            f.configure_bar(0, 1 << 21),
            Err(HarnessError::BarLocked { id: me, index: 0 })
        );
    }
}
