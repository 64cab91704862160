use std::borrow::Borrow;

use super::trap::SatpMode;
use super::Core;
use crate::system_bus::{AccessType, SystemBus};
use crate::{Alignment, Allocator, Endianness, PrivilegeLevel};
use bitvec::field::BitField;
use bitvec::order::Lsb0;
use bitvec::view::BitView;
use log::{debug, trace};
use thiserror::Error;

macro_rules! access_fns {
    ( $( $read_fn:ident, $read_debug_fn:ident, $write_fn:ident => $u:ident ),* $(,)? ) => {
        $(
            /// Invoke a read for the specified address.
            pub fn $read_fn(&self, allocator: &mut A, address: u32) -> Result<$u, MemoryError> {
                trace!("Reading {} from memory at vaddr {address:#010x}", stringify!($u));
                let privilege_level = self.core.effective_privilege_mode(allocator);
                let mut buf = [0u8; std::mem::size_of::<$u>()];
                self.read(&mut buf, allocator, address, privilege_level, false)?;
                Ok(match self.core.endianness(allocator, privilege_level) {
                    Endianness::LE => $u::from_le_bytes(buf),
                    Endianness::BE => $u::from_be_bytes(buf),
                })
            }

            /// Perform a debug read for the specified address.
            ///
            /// See [`Bus::read_debug`](crate::bus::Bus::read_debug) for the difference between this
            /// method and its non-debug counterpart.
            pub fn $read_debug_fn(&self, allocator: &A, address: u32) -> Result<$u, MemoryError> {
                trace!("Debug reading {} from memory at vaddr {address:#010x}", stringify!($u));
                let privilege_level = self.core.effective_privilege_mode(allocator);
                let mut buf = [0u8; std::mem::size_of::<$u>()];
                self.read_debug(&mut buf, allocator, address, privilege_level, false)?;
                Ok(match self.core.endianness(allocator, privilege_level) {
                    Endianness::LE => $u::from_le_bytes(buf),
                    Endianness::BE => $u::from_be_bytes(buf),
                })
            }

            /// Invoke a write for the specified address.
            pub fn $write_fn(
                &self,
                allocator: &mut A,
                address: u32,
                value: $u,
            ) -> Result<(), MemoryError> {
                trace!(value; "Writing {} to memory at vaddr {address:#010x}", stringify!($u));
                let privilege_level = self.core.effective_privilege_mode(allocator);
                let buf = match self.core.endianness(allocator, privilege_level) {
                    Endianness::LE => value.to_le_bytes(),
                    Endianness::BE => value.to_be_bytes(),
                };
                self.write(allocator, address, &buf, privilege_level)
            }
        )*
    };
}

const PAGE_TABLE_LEVELS: u32 = 2;
// log2(Size of a single page (in bytes))
const PAGE_SIZE_SHF: u32 = 12;
// log2(Size of a single PTE (in bytes))
const PTE_SIZE_SHF: u32 = 2;

/// Direct-mapped cache of recently resolved Sv32 leaf translations.
///
/// Walking the (up to) 2-level page table on every access would be correct but slow; like real
/// hardware, we cache the result of each successful walk and consult the cache before falling back
/// to a full walk. The cache is purely an acceleration structure: a miss (or a disabled/flushed
/// cache) always falls back to a full walk, so its contents can never make an access more
/// permissive than that walk would.
pub use tlb::Tlb;

mod tlb {
    /// Number of entries in the direct-mapped table, as suggested for a minimal implementation.
    const ENTRIES: usize = 512;

    /// A cached Sv32 leaf translation, keyed by its full virtual page number.
    #[derive(Debug, Clone, Copy)]
    pub struct Entry {
        pub vpn: u32,
        pub ppn: u32,
        pub r: bool,
        pub w: bool,
        pub x: bool,
        pub u: bool,
        pub d: bool,
    }

    #[derive(Debug, Clone, Copy)]
    struct Slot {
        valid: bool,
        entry: Entry,
    }

    const EMPTY_SLOT: Slot = Slot {
        valid: false,
        entry: Entry {
            vpn: 0,
            ppn: 0,
            r: false,
            w: false,
            x: false,
            u: false,
            d: false,
        },
    };

    #[derive(Debug, Clone)]
    pub struct Tlb {
        slots: Box<[Slot; ENTRIES]>,
    }

    impl Default for Tlb {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Tlb {
        pub fn new() -> Self {
            Self {
                slots: Box::new([EMPTY_SLOT; ENTRIES]),
            }
        }

        fn index(vpn: u32) -> usize {
            vpn as usize % ENTRIES
        }

        /// Looks up `vpn`, returning the cached entry if present.
        pub fn lookup(&self, vpn: u32) -> Option<Entry> {
            let slot = &self.slots[Self::index(vpn)];
            (slot.valid && slot.entry.vpn == vpn).then_some(slot.entry)
        }

        /// Inserts (or replaces) the entry for `entry.vpn`.
        pub fn insert(&mut self, entry: Entry) {
            self.slots[Self::index(entry.vpn)] = Slot { valid: true, entry };
        }

        /// Invalidates every cached entry, as required on `SFENCE.VMA` or a write to `satp`.
        pub fn flush(&mut self) {
            for slot in self.slots.iter_mut() {
                slot.valid = false;
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn entry(vpn: u32, ppn: u32) -> Entry {
            Entry {
                vpn,
                ppn,
                r: true,
                w: true,
                x: false,
                u: false,
                d: false,
            }
        }

        #[test]
        fn test_miss_on_empty_tlb() {
            let tlb = Tlb::new();
            assert!(tlb.lookup(0).is_none());
        }

        #[test]
        fn test_insert_then_lookup_hits() {
            let mut tlb = Tlb::new();
            tlb.insert(entry(5, 0x1000));
            let hit = tlb.lookup(5).expect("entry should be cached");
            assert_eq!(hit.ppn, 0x1000);
            assert!(hit.r && hit.w && !hit.x);
        }

        #[test]
        fn test_lookup_of_different_vpn_at_same_slot_misses() {
            // ENTRIES is 512, so vpn 0 and vpn ENTRIES collide in the same direct-mapped slot.
            let mut tlb = Tlb::new();
            tlb.insert(entry(0, 0x1000));
            assert!(tlb.lookup(ENTRIES as u32).is_none());
        }

        #[test]
        fn test_insert_overwrites_colliding_slot() {
            let mut tlb = Tlb::new();
            tlb.insert(entry(0, 0x1000));
            tlb.insert(entry(ENTRIES as u32, 0x2000));
            assert!(tlb.lookup(0).is_none());
            let hit = tlb.lookup(ENTRIES as u32).expect("second entry should be cached");
            assert_eq!(hit.ppn, 0x2000);
        }

        #[test]
        fn test_insert_replaces_existing_entry_for_same_vpn() {
            let mut tlb = Tlb::new();
            tlb.insert(entry(5, 0x1000));
            tlb.insert(entry(5, 0x2000));
            let hit = tlb.lookup(5).expect("entry should still be cached");
            assert_eq!(hit.ppn, 0x2000);
        }

        #[test]
        fn test_flush_invalidates_all_entries() {
            let mut tlb = Tlb::new();
            tlb.insert(entry(5, 0x1000));
            tlb.insert(entry(6, 0x2000));
            tlb.flush();
            assert!(tlb.lookup(5).is_none());
            assert!(tlb.lookup(6).is_none());
        }

        #[test]
        fn test_cached_permission_bits_reflect_inserted_entry() {
            // The TLB caches only the static page-table permission bits (R/W/X/U) plus the D bit
            // observed at insertion time; the live mstatus.mxr/sum re-check happens against these
            // cached bits at lookup time in the surrounding translation logic, not inside the TLB
            // itself.
            let mut tlb = Tlb::new();
            let mut e = entry(7, 0x3000);
            e.x = true;
            e.d = false;
            tlb.insert(e);
            let hit = tlb.lookup(7).unwrap();
            assert!(hit.x);
            assert!(!hit.d);
        }
    }
}

/// Access wrapper around a raw bus to address it as memory from this core's point of view.
///
/// This is a continuous, circular, byte-addressable address space of `pow(2, 32)` bytes.
/// It is designed as a mapping of address ranges to (hardware) resources.
///
/// This takes into account the core's current privilege level, its memory mapping (i.e. which
/// regions can be accessed), its configuration (e.g. whether misaligned memory accesses are
/// supported), etc.
#[derive(Debug, Clone)]
pub struct Mmu<'c, A: Allocator, B: SystemBus<A>> {
    pub(super) core: &'c Core<A, B>,
}

impl<'c, A: Allocator, B: SystemBus<A>> Mmu<'c, A, B> {
    pub fn read_byte(&self, allocator: &mut A, address: u32) -> Result<u8, MemoryError> {
        trace!("Reading byte from memory at vaddr {address:#010x}");
        let privilege_level = self.core.effective_privilege_mode(allocator);
        let mut buf = [0];
        self.read(&mut buf, allocator, address, privilege_level, false)
            .map(|()| buf[0])
    }

    pub fn read_byte_debug(&self, allocator: &A, address: u32) -> Result<u8, MemoryError> {
        trace!("Debug reading byte from memory at vaddr {address:#010x}");
        let privilege_level = self.core.effective_privilege_mode(allocator);
        let mut buf = [0];
        self.read_debug(&mut buf, allocator, address, privilege_level, false)
            .map(|()| buf[0])
    }

    pub fn write_byte(
        &self,
        allocator: &mut A,
        address: u32,
        value: u8,
    ) -> Result<(), MemoryError> {
        trace!(value; "Writing byte to memory at vaddr {address:#010x}");
        let privilege_level = self.core.effective_privilege_mode(allocator);
        self.write(allocator, address, &[value], privilege_level)
    }

    access_fns! {
        read_halfword, read_halfword_debug, write_halfword => u16,
        read_word, read_word_debug, write_word => u32,
        read_doubleword, read_doubleword_debug, write_doubleword => u64,
        read_quadword, read_quadword_debug, write_quadword => u128,
    }

    /// Reads a naturally-aligned 32-bit little-endian word from memory.
    ///
    /// > The base RISC-V ISA has fixed-length 32-bit instructions that must be naturally aligned on
    /// > 32-bit boundaries.
    ///
    /// > Instructions are stored in memory as a sequence of 16-bit little-endian parcels,
    /// > regardless of memory system endianness. Parcels forming one instruction are stored at
    /// > increasing halfword addresses, with the lowest-addressed parcel holding the
    /// > lowest-numbered bits in the instruction specification.
    pub fn fetch_instruction(&self, allocator: &mut A, address: u32) -> Result<u32, MemoryError> {
        trace!("Fetching instruction from memory at vaddr {address:#010x}");
        let alignment = match self.core.config.strict_instruction_alignment {
            true => Alignment::WORD,
            false => Alignment::HALFWORD,
        };
        if !alignment.is_aligned(address) {
            debug!("Failed to fetch instruction: address misaligned: {address:#010x}");
            return Err(MemoryError::MisalignedAccess);
        }
        // Use the core's current privilege level, not its *effective* privilege level, since that
        // shouldn't be used for instruction fetches.
        let privilege_level = self.core.privilege_mode(allocator);
        let mut buf = [0u8; 4];
        self.read(&mut buf, allocator, address, privilege_level, true)
            .map(|()| u32::from_le_bytes(buf))
    }

    /// Fetches a single naturally-aligned 16-bit little-endian instruction parcel from memory.
    ///
    /// Used to implement the `C` extension's two-phase fetch: a compressed instruction is just one
    /// parcel, while an uncompressed one is assembled from two consecutive parcels.
    pub fn fetch_instruction_parcel(&self, allocator: &mut A, address: u32) -> Result<u16, MemoryError> {
        trace!("Fetching instruction parcel from memory at vaddr {address:#010x}");
        if !Alignment::HALFWORD.is_aligned(address) {
            debug!("Failed to fetch instruction parcel: address misaligned: {address:#010x}");
            return Err(MemoryError::MisalignedAccess);
        }
        let privilege_level = self.core.privilege_mode(allocator);
        let mut buf = [0u8; 2];
        self.read(&mut buf, allocator, address, privilege_level, true)
            .map(|()| u16::from_le_bytes(buf))
    }

    pub fn read_range(
        &self,
        buf: &mut [u8],
        allocator: &mut A,
        address: u32,
    ) -> Result<(), MemoryError> {
        let privilege_level = self.core.privilege_mode(allocator);
        self.read_debug(buf, allocator, address, privilege_level, false)
    }

    pub fn read_range_debug(
        &self,
        buf: &mut [u8],
        allocator: &A,
        address: u32,
    ) -> Result<(), MemoryError> {
        let privilege_level = self.core.privilege_mode(allocator);
        self.read_debug(buf, allocator, address, privilege_level, false)
    }

    pub fn write_range(
        &self,
        allocator: &mut A,
        address: u32,
        buf: &[u8],
    ) -> Result<(), MemoryError> {
        let privilege_level = self.core.privilege_mode(allocator);
        self.write(allocator, address, buf, privilege_level)
    }

    fn read(
        &self,
        buf: &mut [u8],
        allocator: &mut A,
        address: u32,
        privilege_level: PrivilegeLevel,
        execute: bool,
    ) -> Result<(), MemoryError> {
        let access_type = match execute {
            true => AccessType::Execute,
            false => AccessType::Read,
        };
        let physical_address =
            self.access_virtual(allocator, address, buf.len(), access_type, privilege_level)?;
        self.core.system_bus.read(buf, allocator, physical_address);
        Ok(())
    }

    fn read_debug(
        &self,
        buf: &mut [u8],
        allocator: &A,
        address: u32,
        privilege_level: PrivilegeLevel,
        execute: bool,
    ) -> Result<(), MemoryError> {
        let access_type = match execute {
            true => AccessType::Execute,
            false => AccessType::Read,
        };
        let physical_address =
            self.access_virtual_debug(allocator, address, buf.len(), access_type, privilege_level)?;
        self.core
            .system_bus
            .read_debug(buf, allocator, physical_address);
        Ok(())
    }

    fn write(
        &self,
        allocator: &mut A,
        address: u32,
        buf: &[u8],
        privilege_level: PrivilegeLevel,
    ) -> Result<(), MemoryError> {
        let physical_address = self.access_virtual(
            allocator,
            address,
            buf.len(),
            AccessType::Write,
            privilege_level,
        )?;
        self.core.system_bus.write(allocator, physical_address, buf);
        Ok(())
    }

    /// Performs the necessary checks for access virtual `address` of `size` bytes.
    /// Translates the address from virtual to physical.
    fn access_virtual(
        &self,
        allocator: &mut A,
        address: u32,
        size: usize,
        access_type: AccessType,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, MemoryError> {
        self.access_virtual_pre_translate_checks(address, size, access_type)?;
        let physical_address =
            self.translate_address(allocator, address, access_type, privilege_level)?;
        self.access_physical(physical_address, size, access_type)?;
        Ok(physical_address)
    }

    /// Performs the necessary checks for access virtual `address` of `size` bytes.
    /// Translates the address from virtual to physical.
    fn access_virtual_debug(
        &self,
        allocator: &A,
        address: u32,
        size: usize,
        access_type: AccessType,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, MemoryError> {
        self.access_virtual_pre_translate_checks(address, size, access_type)?;
        let physical_address =
            self.translate_address_debug(allocator, address, access_type, privilege_level)?;
        self.access_physical(physical_address, size, access_type)?;
        Ok(physical_address)
    }

    fn access_virtual_pre_translate_checks(
        &self,
        address: u32,
        size: usize,
        access_type: AccessType,
    ) -> Result<(), MemoryError> {
        let size = u32::try_from(size).map_err(|_| MemoryError::AccessFault)?;

        if !self.core.config.support_misaligned_memory_access
            && !Alignment::natural_for_size(size)
                .map(|alignment| alignment.is_aligned(address))
                // If `size` is not a power of two, then the access is always considered unaligned
                .unwrap_or(false)
        {
            debug!(
                address, size, access_type:%,
                core_supports_misaligned_accesses=self.core.config.support_misaligned_memory_access;
                "Memory access misaligned"
            );
            return Err(MemoryError::MisalignedAccess);
        }

        Ok(())
    }

    // Perform PMA & PMP checks for physical (`address`, `size`) accesses of type `access_type`.
    fn access_physical(
        &self,
        address: u32,
        size: usize,
        access_type: AccessType,
    ) -> Result<(), MemoryError> {
        // TODO: PMP checks
        if self.core.system_bus.accepts(address, size, access_type) {
            Ok(())
        } else {
            debug!(
                address, size, access_type:%;
                "Memory access not accepted by system bus"
            );
            Err(MemoryError::AccessFault)
        }
    }

    /// Map a virtual byte address to the corresponding physical byte address.
    fn translate_address(
        &self,
        allocator: &mut A,
        address: u32,
        access_type: AccessType,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, MemoryError> {
        self.translate_address_common(
            allocator,
            address,
            access_type,
            privilege_level,
            |allocator, entry_address| {
                self.read_pte(allocator, entry_address)
                    .map(|entry| (allocator, entry))
            },
            |allocator, address, value| {
                self.write_pte(allocator, address, value).map(|()| allocator)
            },
            |allocator, vpn| {
                let hit = self.core.tlb.get(allocator.borrow()).lookup(vpn);
                (allocator, hit)
            },
            |allocator, entry| {
                self.core.tlb.get_mut(allocator).insert(entry);
                allocator
            },
        )
    }

    /// Map a virtual byte address to the corresponding physical byte address.
    fn translate_address_debug(
        &self,
        allocator: &A,
        address: u32,
        access_type: AccessType,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, MemoryError> {
        self.translate_address_common(
            allocator,
            address,
            access_type,
            privilege_level,
            |allocator, entry_address| {
                self.read_pte_debug(allocator, entry_address)
                    .map(|entry| (allocator, entry))
            },
            |allocator, _address, _value| Ok(allocator),
            |allocator, vpn| {
                let hit = self.core.tlb.get(allocator.borrow()).lookup(vpn);
                (allocator, hit)
            },
            // A debug access must stay effect-free, so a miss is never cached.
            |allocator, _entry| allocator,
        )
    }

    // Base implementation of [`Self::translate_address`] and [`Self::translate_address_debug`].
    fn translate_address_common<ARef: Borrow<A>>(
        &self,
        mut allocator: ARef,
        address: u32,
        access_type: AccessType,
        privilege_level: PrivilegeLevel,
        read_pte: impl Fn(ARef, u32) -> Result<(ARef, u32), MemoryError>,
        write_pte: impl Fn(ARef, u32, u32) -> Result<ARef, MemoryError>,
        tlb_lookup: impl Fn(ARef, u32) -> (ARef, Option<tlb::Entry>),
        tlb_insert: impl Fn(ARef, tlb::Entry) -> ARef,
    ) -> Result<u32, MemoryError> {
        // Satp register must be active (effective privilege mode U or S).
        let user_mode = match privilege_level {
            PrivilegeLevel::Machine => return Ok(address),
            PrivilegeLevel::User => true,
            PrivilegeLevel::Supervisor => false,
        };
        let trap = self.core.trap.get(allocator.borrow());
        match trap.satp_mode() {
            SatpMode::Bare => return Ok(address),
            SatpMode::Sv32 => {}
        };
        // Captured now, since `trap`'s borrow can't outlive the `allocator` move below.
        let satp_ppn = trap.satp_ppn();
        const PAGE_SIZE_MSK: u32 = (1 << PAGE_SIZE_SHF) - 1;
        // log2(Number of PTEs that fit in one page)
        const PTE_COUNT_SHF: u32 = PAGE_SIZE_SHF - PTE_SIZE_SHF;
        const PTE_COUNT_MSK: u32 = (1 << PTE_COUNT_SHF) - 1;

        let full_vpn = address >> PAGE_SIZE_SHF;
        let (mut allocator, cached) = tlb_lookup(allocator, full_vpn);
        if let Some(entry) = cached {
            let status = self.core.status.get(allocator.borrow());
            let allowed = match access_type {
                AccessType::Read => entry.r || (entry.x && status.mxr()),
                AccessType::Write => entry.w,
                AccessType::Execute => entry.x,
            } && ((user_mode == entry.u)
                || (!user_mode && access_type != AccessType::Execute && status.sum()));
            if !allowed {
                return Err(MemoryError::PageFault);
            }
            // A cached entry whose D bit hasn't been set yet can't service a store: the PTE in
            // memory still needs updating, so fall through to a full walk instead.
            if access_type != AccessType::Write || entry.d {
                let page_offset = address & PAGE_SIZE_MSK;
                return Ok((entry.ppn << PAGE_SIZE_SHF) + page_offset);
            }
        }

        // STEP 1
        let mut page_table = satp_ppn << PAGE_SIZE_SHF;
        for level in (0..PAGE_TABLE_LEVELS).rev() {
            // STEP 2
            let vpn = (address >> (PAGE_SIZE_SHF + level * PTE_COUNT_SHF)) & PTE_COUNT_MSK;
            let entry_address = page_table + (vpn << PTE_SIZE_SHF);
            let (a, mut entry) =
                read_pte(allocator, entry_address).map_err(|_| MemoryError::AccessFault)?;
            allocator = a;
            let entry = entry.view_bits_mut::<Lsb0>();
            // STEP 3
            if !entry[pte::V] || (!entry[pte::R] && entry[pte::W]) {
                return Err(MemoryError::PageFault);
            }
            // STEP 4
            if !entry[pte::R] && !entry[pte::X] {
                // This PTE is a pointer to the next level of the page table.
                // But if we're at the last level, this is a page fault.
                if level == 0 {
                    return Err(MemoryError::PageFault);
                }
                page_table = pte::ppn(entry) << PAGE_SIZE_SHF;
                continue;
            }
            // STEP 5
            let allowed = match access_type {
                AccessType::Read => {
                    entry[pte::R]
                        || (entry[pte::X] && self.core.status.get(allocator.borrow()).mxr())
                }
                AccessType::Write => entry[pte::W],
                AccessType::Execute => entry[pte::X],
            } && {
                (user_mode == entry[pte::U])
                    || !user_mode
                        && access_type != AccessType::Execute
                        && self.core.status.get(allocator.borrow()).sum()
            };
            if !allowed {
                return Err(MemoryError::PageFault);
            }
            // STEP 6 & 8
            let mut ppn = pte::ppn(entry);
            if level != 0 {
                // STEP 6
                let mask = (1 << (level * PTE_COUNT_SHF)) - 1;
                if ppn & mask != 0 {
                    return Err(MemoryError::PageFault);
                }
                // STEP 8
                ppn |= vpn & mask;
            }
            // STEP 7
            if !entry[pte::A] || access_type == AccessType::Write && !entry[pte::D] {
                entry.set(pte::A, true);
                entry.set(pte::D, access_type == AccessType::Write);
                allocator = write_pte(allocator, entry_address, entry.load_le())
                    .map_err(|_| MemoryError::AccessFault)?;
            }
            allocator = tlb_insert(
                allocator,
                tlb::Entry {
                    vpn: full_vpn,
                    ppn,
                    r: entry[pte::R],
                    w: entry[pte::W],
                    x: entry[pte::X],
                    u: entry[pte::U],
                    d: entry[pte::D],
                },
            );
            let page_offset = address & PAGE_SIZE_MSK;
            return Ok((ppn << PAGE_SIZE_SHF) + page_offset);
        }
        // The following asserts the above loop is taken.
        const_assert!(PAGE_TABLE_LEVELS > 0);
        // The above loop can only exit through a return, hence this is unreachable.
        unreachable!()
    }

    fn read_pte(&self, allocator: &mut A, address: u32) -> Result<u32, MemoryError> {
        assert_eq!(1 << PTE_SIZE_SHF, 4);
        self.access_physical(address, 4, AccessType::Read)?;
        let mut buf = [0u8; 4];
        self.core.system_bus.read(&mut buf, allocator, address);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_pte_debug(&self, allocator: &A, address: u32) -> Result<u32, MemoryError> {
        assert_eq!(1 << PTE_SIZE_SHF, 4);
        self.access_physical(address, 4, AccessType::Read)?;
        let mut buf = [0u8; 4];
        self.core
            .system_bus
            .read_debug(&mut buf, allocator, address);
        Ok(u32::from_le_bytes(buf))
    }

    fn write_pte(&self, allocator: &mut A, address: u32, value: u32) -> Result<(), MemoryError> {
        assert_eq!(1 << PTE_SIZE_SHF, 4);
        self.access_physical(address, 4, AccessType::Write)?;
        let buf = value.to_le_bytes();
        self.core.system_bus.write(allocator, address, &buf);
        Ok(())
    }
}

mod pte {
    use bitvec::{field::BitField, order::Lsb0, slice::BitSlice};

    pub const V: usize = 0;
    pub const R: usize = 1;
    pub const W: usize = 2;
    pub const X: usize = 3;
    pub const U: usize = 4;
    pub const A: usize = 6;
    pub const D: usize = 7;

    pub fn ppn(entry: &BitSlice<u32, Lsb0>) -> u32 {
        entry[10..32].load_le()
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("misaligned access")]
    MisalignedAccess,
    #[error("access fault")]
    AccessFault,
    #[error("page fault")]
    PageFault,
}
