//! Streaming TLP interfaces between the device adapter and the DUT.
//!
//! A TLP crosses the DUT boundary as a sequence of beats on a valid/ready channel. The header
//! rides alongside every beat, the payload is carried 32 bytes (8 dwords) at a time, and
//! `sop`/`eop` delimit the packet. The request-side interface additionally reports which BAR
//! and function the request decoded to.

use crate::common::constants::{TLP_BEAT_BYTES, TLP_BEAT_DWORDS};
use crate::pcie::tlp::{Tlp, TlpHeader};
use crate::sim::Channel;

/// One beat of a streamed TLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlpBeat {
    /// Header of the packet this beat belongs to.
    pub hdr: TlpHeader,
    /// Payload bytes of this beat, dword-aligned.
    pub data: [u8; TLP_BEAT_BYTES],
    /// Number of valid dwords in `data`.
    pub dwords: u8,
    /// First beat of the packet.
    pub sop: bool,
    /// Last beat of the packet.
    pub eop: bool,
    /// BAR the request decoded to (request interface only).
    pub bar_id: u8,
    /// Function the request decoded to (request interface only).
    pub func_num: u8,
}

/// Request TLPs from the device adapter into the DUT (`rx_req_tlp_*`).
pub type PcieIfRxBus = Channel<TlpBeat>;

/// Completion TLPs from the DUT back to the device adapter (`tx_cpl_tlp_*`).
pub type PcieIfTxBus = Channel<TlpBeat>;

/// Splits a TLP into beats.
///
/// Packets without payload occupy a single beat with `sop` and `eop` both set.
pub fn to_beats(tlp: &Tlp, bar_id: u8, func_num: u8) -> Vec<TlpBeat> {
    let base = TlpBeat {
        hdr: tlp.header,
        bar_id,
        func_num,
        ..TlpBeat::default()
    };
    if tlp.data.is_empty() {
        return vec![TlpBeat {
            sop: true,
            eop: true,
            ..base
        }];
    }
    let count = tlp.data.len().div_ceil(TLP_BEAT_BYTES);
    tlp.data
        .chunks(TLP_BEAT_BYTES)
        .enumerate()
        .map(|(i, chunk)| {
            let mut beat = TlpBeat {
                sop: i == 0,
                eop: i + 1 == count,
                dwords: chunk.len().div_ceil(4).min(TLP_BEAT_DWORDS) as u8,
                ..base
            };
            beat.data[..chunk.len()].copy_from_slice(chunk);
            beat
        })
        .collect()
}

/// Reassembles beats into whole TLPs.
#[derive(Debug, Default, Clone)]
pub struct TlpAssembler {
    current: Option<Tlp>,
    bar_id: u8,
    func_num: u8,
}

impl TlpAssembler {
    /// Creates an idle assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a partially received packet.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Returns `true` while a packet is partially received.
    pub const fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    /// Adds a beat.
    ///
    /// # Returns
    ///
    /// The completed packet and the BAR/function it decoded to on its last beat.
    /// A beat without `sop` while idle is discarded; a new `sop` restarts the packet.
    pub fn push(&mut self, beat: &TlpBeat) -> Option<(Tlp, u8, u8)> {
        if beat.sop {
            self.current = Some(Tlp {
                header: beat.hdr,
                data: Vec::with_capacity(beat.hdr.length_dw as usize * 4),
            });
            self.bar_id = beat.bar_id;
            self.func_num = beat.func_num;
        }
        let tlp = self.current.as_mut()?;
        let bytes = beat.dwords as usize * 4;
        tlp.data.extend_from_slice(&beat.data[..bytes.min(TLP_BEAT_BYTES)]);
        if !beat.eop {
            return None;
        }
        let mut tlp = self.current.take()?;
        if tlp.header.tlp_type.has_data() {
            tlp.data.resize(tlp.header.length_dw as usize * 4, 0);
        } else {
            tlp.data.clear();
        }
        Some((tlp, self.bar_id, self.func_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PcieId;

    #[test]
    fn payload_spans_beats_and_reassembles() {
        let payload: Vec<u8> = (0..70u8).collect();
        let tlp = Tlp::mem_write(PcieId::new(0, 0, 0), 3, 0x8000_1001, &payload);
        let beats = to_beats(&tlp, 0, 0);
        assert_eq!(beats.len(), 3);
        assert!(beats[0].sop && !beats[0].eop);
        assert!(beats[2].eop);
        assert_eq!(beats[2].dwords, 2);

        let mut asm = TlpAssembler::new();
        let mut out = None;
        for beat in &beats {
            out = asm.push(beat);
        }
        let (back, _, _) = out.unwrap();
        assert_eq!(back, tlp);
        assert_eq!(back.write_payload(), payload.as_slice());
    }

    #[test]
    fn header_only_packets_use_one_beat() {
        let tlp = Tlp::mem_read(PcieId::new(0, 0, 0), 1, 0x8000_0000, 64);
        let beats = to_beats(&tlp, 2, 1);
        assert_eq!(beats.len(), 1);
        let (back, bar, func) = TlpAssembler::new().push(&beats[0]).unwrap();
        assert_eq!((bar, func), (2, 1));
        assert!(back.data.is_empty());
    }
}
