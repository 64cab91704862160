pub mod allocator;
pub mod errors;
pub(crate) mod array_storage;
pub mod ids;
pub(crate) mod snapshot;
pub(crate) mod table;
pub(crate) mod typemap;

use std::ops::{Bound, RangeBounds};

use generational_arena::{Arena, Index};

use allocator::{Allocator, ArrayAccessor, ArrayAccessorMut};
use array_storage::{ArrayStorage, ArrayStorageTrait, Instance};
use errors::{InvalidIdError, InvalidSnapshotIdError};
use ids::SpaceTimeId;
use snapshot::{Snapshot, TypedInstance, TypedTablePtr};
use table::{Table, TableTrait};
use typemap::{ArrayStorageTypeMap, TableTypeMap};

/// Identifies a snapshot previously taken of a [`SpaceTime`] using [`SpaceTime::make_snapshot`].
///
/// A [`SnapshotId`] stays valid until it is passed to [`SpaceTime::drop_snapshot`], or until the
/// [`SpaceTime`] that created it is dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SnapshotId(Index);

/// An allocator that keeps track of every object and array it hands out well enough to be able to
/// restore its entire state to any snapshot made of it in the past.
///
/// Objects of the same type `T` are packed together internally (see [`Allocator::insert`]), and
/// snapshots only duplicate the references to the pages that changed since the last snapshot, not
/// the pages themselves. This makes [`SpaceTime`] suitable as the backing store for the register
/// files, CSR files, and main memory of a simulated hart: most of a guest's state stays identical
/// between two adjacent simulated steps, so most pages are shared between consecutive snapshots.
#[derive(Debug)]
pub struct SpaceTime {
    tables: TableTypeMap,
    arrays: ArrayStorageTypeMap,
    /// The state currently being mutated/inspected through the [`Allocator`] interface.
    live: Snapshot,
    /// Snapshots taken of `live` in the past, that can be restored to using [`Self::checkout`].
    archive: Arena<Snapshot>,
}

impl Default for SpaceTime {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceTime {
    /// Creates a new, empty [`SpaceTime`] with no objects, arrays, or snapshots.
    pub fn new() -> Self {
        Self {
            tables: TableTypeMap::default(),
            arrays: ArrayStorageTypeMap::default(),
            live: Snapshot::default(),
            archive: Arena::new(),
        }
    }

    /// Takes a snapshot of the current state, returning a [`SnapshotId`] that can later be passed
    /// to [`Self::checkout`] to restore this exact state.
    ///
    /// This is a cheap operation: it only increments the reference count of the pages backing the
    /// objects and arrays currently allocated; no data is copied.
    pub fn make_snapshot(&mut self) -> SnapshotId {
        let snapshot = Self::clone_snapshot(&mut self.tables, &mut self.arrays, &self.live);
        SnapshotId(self.archive.insert(snapshot))
    }

    /// Restores the state to the snapshot identified by `snapshot_id`.
    ///
    /// The snapshot itself is not consumed, and can be checked out again later, or dropped using
    /// [`Self::drop_snapshot`]. The state that was live before calling this method is discarded,
    /// as if it had never been made into a snapshot.
    pub fn checkout(&mut self, snapshot_id: SnapshotId) -> Result<(), InvalidSnapshotIdError> {
        let source = self.archive.get(snapshot_id.0).ok_or(InvalidSnapshotIdError)?;
        let new_live = Self::clone_snapshot(&mut self.tables, &mut self.arrays, source);
        let old_live = std::mem::replace(&mut self.live, new_live);
        Self::release_snapshot(&mut self.tables, &mut self.arrays, old_live);
        Ok(())
    }

    /// Drops a previously made snapshot, freeing any pages that are no longer referenced by any
    /// other snapshot or the live state.
    pub fn drop_snapshot(&mut self, snapshot_id: SnapshotId) -> Result<(), InvalidSnapshotIdError> {
        let snapshot = self
            .archive
            .remove(snapshot_id.0)
            .ok_or(InvalidSnapshotIdError)?;
        Self::release_snapshot(&mut self.tables, &mut self.arrays, snapshot);
        Ok(())
    }

    /// Clones `source`, adding a reference to every page/instance it points to.
    fn clone_snapshot(
        tables: &mut TableTypeMap,
        arrays: &mut ArrayStorageTypeMap,
        source: &Snapshot,
    ) -> Snapshot {
        let mut table_ptrs = Vec::new();
        for typed in source.iter_table_ptrs() {
            let table = tables
                .get_with_id_mut(typed.type_id)
                .expect("table referenced by a snapshot must still exist");
            let table_ptr = table.clone_table_ptr(&typed.table_ptr);
            table_ptrs.push(TypedTablePtr {
                table_ptr,
                type_id: typed.type_id,
            });
        }

        let mut instances = Vec::new();
        for typed in source.iter_instances() {
            let array_storage = arrays
                .get_with_id_mut(typed.type_id)
                .expect("array storage referenced by a snapshot must still exist");
            let instance = array_storage.clone_instance(&typed.instance);
            instances.push(TypedInstance {
                instance,
                type_id: typed.type_id,
            });
        }

        Snapshot::from_iterators(table_ptrs.into_iter(), instances.into_iter())
    }

    /// Releases every reference held by `snapshot`, dropping pages/instances that are no longer
    /// referenced by anything else.
    fn release_snapshot(tables: &mut TableTypeMap, arrays: &mut ArrayStorageTypeMap, snapshot: Snapshot) {
        let (table_ptrs, instances) = snapshot.into_iterators();

        for typed in table_ptrs {
            if let Some(table) = tables.get_with_id_mut(typed.type_id) {
                table.drop_table_ptr(typed.table_ptr);
            }
        }

        for typed in instances {
            if let Some(array_storage) = arrays.get_with_id_mut(typed.type_id) {
                array_storage.drop_instance(typed.instance);
            }
        }
    }
}

impl Allocator for SpaceTime {
    type Id<T> = SpaceTimeId<T, false>;
    type ArrayId<T> = SpaceTimeId<T, true>;

    fn insert<T: Clone + 'static>(&mut self, object: T) -> Self::Id<T> {
        let (type_id, table) = self.tables.get_or_default_mut::<T>();
        let table_ptr = table.add_item(object);
        let index = self.live.add_table_ptr(table_ptr, type_id);
        SpaceTimeId::new(index)
    }

    fn insert_array<T: Copy + 'static>(&mut self, object: T, n: usize) -> Self::ArrayId<T> {
        let (type_id, array_storage) = self.arrays.get_or_default_mut::<T>();
        let instance = array_storage.new_instance(object, n as u64);
        let index = self.live.add_instance(instance, type_id);
        SpaceTimeId::new(index)
    }

    fn remove<T: Clone + 'static>(&mut self, id: Self::Id<T>) -> Result<(), InvalidIdError> {
        let typed = self.live.remove_table_ptr(id.index).ok_or(InvalidIdError)?;
        let table = self.tables.get_mut::<T>().ok_or(InvalidIdError)?;
        table.drop_table_ptr(typed.table_ptr);
        Ok(())
    }

    fn remove_array<T: Copy + 'static>(&mut self, id: Self::ArrayId<T>) -> Result<(), InvalidIdError> {
        let typed = self.live.remove_instance(id.index).ok_or(InvalidIdError)?;
        let array_storage = self.arrays.get_mut::<T>().ok_or(InvalidIdError)?;
        array_storage.remove_instance(typed.instance);
        Ok(())
    }

    fn pop<T: Clone + 'static>(&mut self, id: Self::Id<T>) -> Result<T, InvalidIdError> {
        let typed = self.live.remove_table_ptr(id.index).ok_or(InvalidIdError)?;
        let table = self.tables.get_mut::<T>().ok_or(InvalidIdError)?;
        Ok(table.pop_or_get_item(typed.table_ptr))
    }

    fn get<T: Clone + 'static>(&self, id: Self::Id<T>) -> Result<&T, InvalidIdError> {
        let typed = self.live.get_table_ptr(id.index).ok_or(InvalidIdError)?;
        let table = self.tables.get::<T>().ok_or(InvalidIdError)?;
        Ok(table.get_item(&typed.table_ptr))
    }

    fn get_array<'a, T: 'a + Copy + 'static>(
        &'a self,
        id: Self::ArrayId<T>,
    ) -> Result<impl ArrayAccessor<'a, T>, InvalidIdError> {
        let typed = self.live.get_instance(id.index).ok_or(InvalidIdError)?;
        let array_storage = self.arrays.get::<T>().ok_or(InvalidIdError)?;
        Ok(ArrayRef {
            instance: &typed.instance,
            array_storage,
        })
    }

    fn get_mut<T: Clone + 'static>(&mut self, id: Self::Id<T>) -> Result<&mut T, InvalidIdError> {
        let typed = self.live.get_table_ptr_mut(id.index).ok_or(InvalidIdError)?;
        let table = self.tables.get_mut::<T>().ok_or(InvalidIdError)?;

        if !table.is_unique_table_ptr(&typed.table_ptr) {
            // Safety: we overwrite `typed.table_ptr` right after with the new, unique, ptr
            // returned by `clone_item`, which itself drops the ptr passed in to it. The old value
            // never gets used again, so there is never a duplicate live `TablePtr` for the same
            // page.
            let old_ptr = typed.table_ptr.unsafe_clone();
            typed.table_ptr = table.clone_item(old_ptr, T::clone);
        }

        Ok(table
            .get_item_mut(&typed.table_ptr)
            .expect("table_ptr was just made unique"))
    }

    fn get_array_mut<'a, T: 'a + Copy + 'static>(
        &'a mut self,
        id: Self::ArrayId<T>,
    ) -> Result<impl ArrayAccessorMut<'a, T>, InvalidIdError> {
        let typed = self.live.get_instance_mut(id.index).ok_or(InvalidIdError)?;
        let len = typed.instance.len() as usize;
        let instance: *mut Instance = &mut typed.instance;

        let array_storage = self.arrays.get_mut::<T>().ok_or(InvalidIdError)?;
        let array_storage: *mut ArrayStorage<T> = array_storage;

        Ok(ArrayRefMut {
            instance,
            array_storage,
            len,
            _marker: std::marker::PhantomData,
        })
    }
}

/// Converts any `R: RangeBounds<usize>` into a `(start, len)` pair, clamped to `[0, bound]`.
///
/// Returns `None` if the range is inverted (start after end).
fn range_to_start_len<R: RangeBounds<usize>>(range: R, bound: usize) -> Option<(usize, usize)> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s + 1,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e + 1,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => bound,
    };
    if start > end {
        return None;
    }
    Some((start, end - start))
}

struct ArrayRef<'a, T: Copy + 'static> {
    instance: &'a Instance,
    array_storage: &'a ArrayStorage<T>,
}

impl<'a, T: Copy + 'static> ArrayAccessor<'a, T> for ArrayRef<'a, T> {
    fn len(&self) -> usize {
        self.instance.len() as usize
    }

    fn get(&self, index: usize) -> Option<T> {
        self.instance.get(self.array_storage, index as u64).copied()
    }

    fn get_ref(&self, index: usize) -> Option<&'a T> {
        self.instance.get(self.array_storage, index as u64)
    }

    fn read(&self, buf: &mut [T], index: usize) -> bool {
        self.instance.read(self.array_storage, buf, index as u64)
    }

    fn iter_range<R>(&self, index_range: R) -> Option<impl IntoIterator<Item = &'a T> + 'a>
    where
        R: RangeBounds<usize>,
    {
        let (start, len) = range_to_start_len(index_range, self.len())?;
        self.instance
            .iter_range(self.array_storage, start as u64, len as u64)
    }
}

/// Grants mutable access into a single array stored in a [`SpaceTime`].
///
/// Internally this holds raw pointers rather than a `&mut Instance`/`&mut ArrayStorage<T>` pair, so
/// that indices can be accessed mutably one at a time through a shared `&self`, as required by
/// [`ArrayAccessorMut`]. This is sound because an [`ArrayRefMut`] can only be constructed from a
/// `&'a mut SpaceTime` (see [`Allocator::get_array_mut`]), which guarantees exclusive access to the
/// pointed-to data for all of `'a`; nothing else can observe or alias it for the lifetime of this
/// accessor.
struct ArrayRefMut<'a, T: Copy + 'static> {
    instance: *mut Instance,
    array_storage: *mut ArrayStorage<T>,
    len: usize,
    _marker: std::marker::PhantomData<&'a mut T>,
}

impl<'a, T: Copy + 'static> ArrayAccessor<'a, T> for ArrayRefMut<'a, T> {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Option<T> {
        // Safety: see the invariant documented on `ArrayRefMut`.
        unsafe { (*self.instance).get(&*self.array_storage, index as u64).copied() }
    }

    fn get_ref(&self, index: usize) -> Option<&'a T> {
        // Safety: see the invariant documented on `ArrayRefMut`.
        unsafe { (*self.instance).get(&*self.array_storage, index as u64) }
    }

    fn read(&self, buf: &mut [T], index: usize) -> bool {
        // Safety: see the invariant documented on `ArrayRefMut`.
        unsafe { (*self.instance).read(&*self.array_storage, buf, index as u64) }
    }

    fn iter_range<R>(&self, index_range: R) -> Option<impl IntoIterator<Item = &'a T> + 'a>
    where
        R: RangeBounds<usize>,
    {
        let (start, len) = range_to_start_len(index_range, self.len())?;
        // Safety: see the invariant documented on `ArrayRefMut`.
        unsafe {
            (*self.instance).iter_range(&*self.array_storage, start as u64, len as u64)
        }
    }
}

impl<'a, T: Copy + 'static> ArrayAccessorMut<'a, T> for ArrayRefMut<'a, T> {
    fn get_mut(&self, index: usize) -> Option<&'a mut T> {
        if index >= self.len {
            return None;
        }
        // Safety: see the invariant documented on `ArrayRefMut`. The index bound check above
        // ensures this never aliases the `Instance`/`ArrayStorage` bookkeeping itself, only the
        // single stored element at `index`.
        unsafe { (*self.instance).get_mut(&mut *self.array_storage, index as u64) }
    }

    fn set(&self, index: usize, value: T) -> bool {
        match self.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn write(&self, index: usize, buf: &[T]) -> bool {
        // Safety: see the invariant documented on `ArrayRefMut`.
        unsafe { (*self.instance).write(&mut *self.array_storage, index as u64, buf) }
    }

    fn iter_range_mut<R>(&self, index_range: R) -> Option<impl IntoIterator<Item = &'a mut T> + 'a>
    where
        R: RangeBounds<usize>,
    {
        let (start, len) = range_to_start_len(index_range, self.len)?;
        if start + len > self.len {
            return None;
        }
        let mut items = Vec::with_capacity(len);
        for index in start..(start + len) {
            items.push(self.get_mut(index).expect("index was just bounds-checked"));
        }
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_roundtrip() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert(42u32);
        assert_eq!(space_time.get(id), Ok(&42));
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert(1u32);
        *space_time.get_mut(id).unwrap() += 41;
        assert_eq!(space_time.get(id), Ok(&42));
    }

    #[test]
    fn snapshot_restores_old_value() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert(1u32);

        let snapshot = space_time.make_snapshot();

        *space_time.get_mut(id).unwrap() = 2;
        assert_eq!(space_time.get(id), Ok(&2));

        space_time.checkout(snapshot).unwrap();
        assert_eq!(space_time.get(id), Ok(&1));
    }

    #[test]
    fn drop_snapshot_invalidates_it() {
        let mut space_time = SpaceTime::new();
        space_time.insert(1u32);

        let snapshot = space_time.make_snapshot();
        space_time.drop_snapshot(snapshot).unwrap();

        assert_eq!(space_time.checkout(snapshot), Err(InvalidSnapshotIdError));
    }

    #[test]
    fn remove_makes_id_invalid() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert(1u32);
        space_time.remove(id).unwrap();
        assert_eq!(space_time.get(id), Err(InvalidIdError));
    }

    #[test]
    fn array_read_write_roundtrip() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert_array(0u8, 16);

        {
            let array = space_time.get_array_mut(id).unwrap();
            assert!(array.set(4, 7));
        }

        let array = space_time.get_array(id).unwrap();
        assert_eq!(array.get(4), Some(7));
        assert_eq!(array.get(5), Some(0));
    }

    #[test]
    fn array_snapshot_is_independent_of_later_writes() {
        let mut space_time = SpaceTime::new();
        let id = space_time.insert_array(0u8, 16);
        space_time.get_array_mut(id).unwrap().set(0, 1);

        let snapshot = space_time.make_snapshot();

        space_time.get_array_mut(id).unwrap().set(0, 2);
        assert_eq!(space_time.get_array(id).unwrap().get(0), Some(2));

        space_time.checkout(snapshot).unwrap();
        assert_eq!(space_time.get_array(id).unwrap().get(0), Some(1));
    }
}
