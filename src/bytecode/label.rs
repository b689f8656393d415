use crate::invariant::{Violation, fatal};

/// Handle for a code address that may not be known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Slot {
    address: Option<u32>,
    /// Byte offsets of placeholders waiting for `address`.
    fixups: Vec<usize>,
}

/// Arena of labels and their pending fixups.
///
/// Fixups are byte offsets into the code buffer, never references into it,
/// since the buffer reallocates as it grows.
#[derive(Debug, Default)]
pub struct LabelTable {
    slots: Vec<Slot>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make(&mut self) -> Label {
        let label = Label(self.slots.len() as u32);
        self.slots.push(Slot::default());
        label
    }

    pub fn address(&self, label: Label) -> Option<u32> {
        self.slot(label).address
    }

    /// Write a reference to `label` at the end of `code`: the final address
    /// if known, a zero placeholder plus a fixup otherwise.
    pub fn reference(&mut self, label: Label, code: &mut Vec<u8>) {
        let at = code.len();
        let slot = self.slot_mut(label);
        let address = match slot.address {
            Some(address) => address,
            None => {
                slot.fixups.push(at);
                0
            }
        };
        code.extend_from_slice(&address.to_le_bytes());
    }

    /// Bind `label` to the current end of `code` and patch every
    /// placeholder recorded for it.
    pub fn place(&mut self, label: Label, code: &mut [u8]) -> u32 {
        let address = to_address(code.len());
        let slot = self.slot_mut(label);
        if slot.address.is_some() {
            fatal(Violation::LabelPlacedTwice(label.0));
        }
        slot.address = Some(address);
        for at in slot.fixups.drain(..) {
            code[at..at + 4].copy_from_slice(&address.to_le_bytes());
        }
        address
    }

    /// Abort if any label was referenced but never placed.
    pub fn check_resolved(&self) {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.address.is_none() && !slot.fixups.is_empty())
        {
            fatal(Violation::LabelNeverPlaced(index as u32));
        }
    }

    fn slot(&self, label: Label) -> &Slot {
        &self.slots[label.0 as usize]
    }

    fn slot_mut(&mut self, label: Label) -> &mut Slot {
        &mut self.slots[label.0 as usize]
    }
}

pub(crate) fn to_address(offset: usize) -> u32 {
    u32::try_from(offset).unwrap_or_else(|_| fatal(Violation::AddressOverflow(offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(code: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(code[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_labels_are_monotonic() {
        let mut labels = LabelTable::new();

        let a = labels.make();
        let b = labels.make();

        assert!(a < b);
        assert_eq!(b.to_string(), "L1");
    }

    #[test]
    fn test_forward_reference_is_patched() {
        let mut labels = LabelTable::new();
        let mut code = vec![0xaa];
        let target = labels.make();

        labels.reference(target, &mut code);
        labels.reference(target, &mut code);
        assert_eq!(read_u32(&code, 1), 0);

        code.extend_from_slice(&[0xbb, 0xcc]);
        let address = labels.place(target, &mut code);

        assert_eq!(address, 11);
        assert_eq!(read_u32(&code, 1), 11);
        assert_eq!(read_u32(&code, 5), 11);
    }

    #[test]
    fn test_backward_reference_is_direct() {
        let mut labels = LabelTable::new();
        let mut code = vec![0; 3];
        let target = labels.make();
        labels.place(target, &mut code);

        labels.reference(target, &mut code);

        assert_eq!(read_u32(&code, 3), 3);
        assert_eq!(labels.address(target), Some(3));
        labels.check_resolved();
    }

    #[test]
    #[should_panic(expected = "placed twice")]
    fn test_double_placement_is_fatal() {
        let mut labels = LabelTable::new();
        let mut code = Vec::new();
        let label = labels.make();

        labels.place(label, &mut code);
        labels.place(label, &mut code);
    }

    #[test]
    #[should_panic(expected = "L0 referenced but never placed")]
    fn test_dangling_reference_is_fatal() {
        let mut labels = LabelTable::new();
        let mut code = Vec::new();
        let label = labels.make();
        labels.reference(label, &mut code);

        labels.check_resolved();
    }

    #[test]
    fn test_unreferenced_label_may_stay_unplaced() {
        let mut labels = LabelTable::new();
        labels.make();

        labels.check_resolved();
    }
}
