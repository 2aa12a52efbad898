//! Label lifecycle and in-place displacement patching.
//!
//! References may be recorded before or after their label is bound:
//! backward references patch immediately, forward references are queued
//! and patched when [`LabelTable::bind`] runs.  Displacements are measured
//! from the end of the displacement field, which for every branch form the
//! engine emits coincides with the end of the instruction — the CPU's
//! convention for relative branches.

use alloc::format;
use alloc::vec::Vec;

use crate::buffer::CodeBuffer;
use crate::engine::RefKind;
use crate::error::JitError;
use crate::operand::Label;

/// One recorded reference site awaiting (or already given) a patch.
#[derive(Debug, Clone, Copy)]
struct RefSite {
    /// Offset of the displacement field in the code buffer.
    offset: usize,
    /// Field width and patch rule.
    kind: RefKind,
}

#[derive(Debug, Default)]
struct LabelEntry {
    /// Resolved address, absent until bound.
    address: Option<usize>,
    /// Reference sites recorded before binding.
    pending: Vec<RefSite>,
}

/// Tracks every label of one session and rewrites displacement bytes as
/// labels resolve.
#[derive(Debug, Default)]
pub(crate) struct LabelTable {
    entries: Vec<LabelEntry>,
}

/// Signed displacement from a reference site to its target, checked
/// against the field width.
fn displacement(target: usize, site: RefSite, label: Label) -> Result<i64, JitError> {
    let disp = target as i64 - (site.offset + site.kind.size()) as i64;
    if disp.unsigned_abs() > site.kind.max_disp() as u64 {
        return Err(JitError::DisplacementOutOfRange {
            label: label.id(),
            disp,
            max: site.kind.max_disp(),
        });
    }
    Ok(disp)
}

fn patch(buf: &mut CodeBuffer, site: RefSite, target: usize, label: Label) -> Result<(), JitError> {
    let disp = displacement(target, site, label)?;
    match site.kind {
        RefKind::Rel8 => buf.patch(site.offset, &[disp as i8 as u8]),
        RefKind::Rel32 => buf.patch(site.offset, &(disp as i32).to_le_bytes()),
    }
    Ok(())
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let id = self.entries.len() as u32;
        self.entries.push(LabelEntry::default());
        Label(id)
    }

    fn entry(&self, label: Label) -> Result<&LabelEntry, JitError> {
        self.entries
            .get(label.id() as usize)
            .ok_or(JitError::UnknownOperand {
                token: format!("{}", label),
            })
    }

    fn entry_mut(&mut self, label: Label) -> Result<&mut LabelEntry, JitError> {
        self.entries
            .get_mut(label.id() as usize)
            .ok_or(JitError::UnknownOperand {
                token: format!("{}", label),
            })
    }

    /// The label's bound address, if bound.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::UnknownOperand`] for a label this table never
    /// allocated (a label from a different session).
    pub fn address_of(&self, label: Label) -> Result<Option<usize>, JitError> {
        Ok(self.entry(label)?.address)
    }

    /// Pre-flight check that a reference at `offset` could be patched to
    /// the label's target, without writing anything.
    ///
    /// Always succeeds for an unbound label — the range is only knowable
    /// once both ends exist.
    pub fn check_reference(
        &self,
        label: Label,
        offset: usize,
        kind: RefKind,
    ) -> Result<(), JitError> {
        if let Some(target) = self.entry(label)?.address {
            displacement(target, RefSite { offset, kind }, label)?;
        }
        Ok(())
    }

    /// Record a reference site.  Patches immediately when the label is
    /// already bound, otherwise queues the site for [`bind`](Self::bind).
    pub fn record(
        &mut self,
        label: Label,
        offset: usize,
        kind: RefKind,
        buf: &mut CodeBuffer,
    ) -> Result<(), JitError> {
        let site = RefSite { offset, kind };
        match self.entry(label)?.address {
            Some(target) => patch(buf, site, target, label),
            None => {
                self.entry_mut(label)?.pending.push(site);
                Ok(())
            }
        }
    }

    /// Bind a label to `address` and patch every pending reference.
    ///
    /// # Errors
    ///
    /// [`JitError::LabelAlreadyBound`] when the label is already bound;
    /// [`JitError::DisplacementOutOfRange`] when a queued 8-bit reference
    /// cannot reach the address.
    pub fn bind(
        &mut self,
        label: Label,
        address: usize,
        buf: &mut CodeBuffer,
    ) -> Result<(), JitError> {
        let entry = self.entry_mut(label)?;
        if let Some(existing) = entry.address {
            return Err(JitError::LabelAlreadyBound {
                label: label.id(),
                address: existing,
            });
        }
        entry.address = Some(address);
        let pending = core::mem::take(&mut entry.pending);
        for site in &pending {
            patch(buf, *site, address, label)?;
        }
        Ok(())
    }

    /// Identifiers of every label created but never bound, in creation
    /// order.
    pub fn unbound(&self) -> Vec<u32> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.address.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }
}
