//! Annex-B NAL unit splitting and access unit assembly shared by the
//! H.264 and H.265 producers.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use super::AccessUnit;

/// Split an Annex-B byte stream into NAL units (start codes removed).
///
/// A payload without any start code is returned as a single NAL unit.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    if starts.is_empty() {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (index, &(_, payload_start)) in starts.iter().enumerate() {
        let mut end = starts
            .get(index + 1)
            .map_or(data.len(), |&(code_start, _)| code_start);
        // trailing zero belongs to a 4-byte start code
        while end > payload_start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > payload_start {
            nals.push(&data[payload_start..end]);
        }
    }
    nals
}

/// How a NAL unit participates in access unit assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalRole {
    /// Parameter set captured for the init segment, identified by slot.
    ParameterSet(usize),
    /// Access unit delimiter, dropped.
    Delimiter,
    /// Random access point picture.
    SyncPicture,
    /// Any other NAL unit carried in the access unit.
    Other,
}

/// Aggregates NAL units sharing one presentation time into length-prefixed
/// access units, capturing parameter sets on the way.
#[derive(Debug)]
pub struct AccessUnitAssembler<const N: usize> {
    parameter_sets: [Option<Bytes>; N],
    pending: Option<PendingUnit>,
}

#[derive(Debug)]
struct PendingUnit {
    presentation_time: Duration,
    data: BytesMut,
    is_sync: bool,
}

impl<const N: usize> Default for AccessUnitAssembler<N> {
    fn default() -> Self {
        Self {
            parameter_sets: std::array::from_fn(|_| None),
            pending: None,
        }
    }
}

impl<const N: usize> AccessUnitAssembler<N> {
    /// Feed the NAL units of one frame.
    ///
    /// Returns the previous access unit once a frame with a different
    /// presentation time arrives.
    pub fn push(
        &mut self,
        payload: &[u8],
        presentation_time: Duration,
        classify: impl Fn(&[u8]) -> NalRole,
    ) -> Option<AccessUnit> {
        let ready = match &self.pending {
            Some(pending) if pending.presentation_time != presentation_time => self.take(),
            _ => None,
        };

        let pending = self.pending.get_or_insert_with(|| PendingUnit {
            presentation_time,
            data: BytesMut::new(),
            is_sync: false,
        });

        for nal in split_annex_b(payload) {
            match classify(nal) {
                NalRole::ParameterSet(slot) if slot < N => {
                    self.parameter_sets[slot] = Some(Bytes::copy_from_slice(nal));
                }
                NalRole::ParameterSet(_) | NalRole::Delimiter => {}
                role => {
                    pending.is_sync |= role == NalRole::SyncPicture;
                    pending.data.put_u32(nal.len() as u32);
                    pending.data.put_slice(nal);
                }
            }
        }

        ready
    }

    /// Take the access unit being assembled, if it holds any picture data.
    pub fn take(&mut self) -> Option<AccessUnit> {
        let pending = self.pending.take()?;
        if pending.data.is_empty() {
            return None;
        }
        Some(AccessUnit {
            presentation_time: pending.presentation_time,
            data: pending.data.freeze(),
            is_sync: pending.is_sync,
        })
    }

    pub fn parameter_set(&self, slot: usize) -> Option<&Bytes> {
        self.parameter_sets.get(slot).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(nal: &[u8]) -> NalRole {
        match nal[0] & 0x1F {
            7 => NalRole::ParameterSet(0),
            9 => NalRole::Delimiter,
            5 => NalRole::SyncPicture,
            _ => NalRole::Other,
        }
    }

    #[test]
    fn test_split_mixed_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 0x64, 0, 0, 1, 0x68, 0xEE, 0, 0, 0, 1, 0x65, 0x88];
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x67, 0x64][..], &[0x68, 0xEE][..], &[0x65, 0x88][..]]);
    }

    #[test]
    fn test_split_without_start_code() {
        assert_eq!(split_annex_b(&[0x41, 0x9A]), vec![&[0x41, 0x9A][..]]);
        assert!(split_annex_b(&[]).is_empty());
    }

    #[test]
    fn test_assembler_emits_on_new_timestamp() {
        let mut asm = AccessUnitAssembler::<1>::default();
        let t0 = Duration::ZERO;
        let t1 = Duration::from_millis(40);

        assert!(asm.push(&[0, 0, 1, 0x67, 0x64], t0, classify).is_none());
        assert!(asm.push(&[0, 0, 1, 0x09, 0xF0], t0, classify).is_none());
        assert!(asm.push(&[0, 0, 1, 0x65, 0x88], t0, classify).is_none());
        assert_eq!(asm.parameter_set(0).unwrap().as_ref(), &[0x67, 0x64]);

        let au = asm.push(&[0, 0, 1, 0x41, 0x9A], t1, classify).unwrap();
        assert_eq!(au.presentation_time, t0);
        assert!(au.is_sync);
        assert_eq!(au.data.as_ref(), &[0, 0, 0, 2, 0x65, 0x88]);

        let last = asm.take().unwrap();
        assert_eq!(last.presentation_time, t1);
        assert!(!last.is_sync);
        assert!(asm.take().is_none());
    }

    #[test]
    fn test_parameter_set_only_frame_yields_nothing() {
        let mut asm = AccessUnitAssembler::<1>::default();
        assert!(asm.push(&[0x67, 0x64], Duration::ZERO, classify).is_none());
        assert!(asm
            .push(&[0x65, 0x88], Duration::from_millis(40), classify)
            .is_none());
        assert!(asm.take().is_some());
    }
}
