use std::collections::HashMap;

use crate::{
    error::{ErrorKind, PsResult},
    object::{
        ArrayIndex, ArraySlice, ArrayStore, DictHandle, DictIndex, DictStore, Object, SaveId,
        StringIndex, StringSlice, StringStore, Value,
    },
};

/// One VM heap: the arena slots backing composite objects. Slot indices are
/// allocated monotonically, so a save's high-water marks identify everything
/// allocated after it.
#[derive(Debug, Default)]
pub struct Heap {
    arrays: Vec<ArrayStore>,
    strings: Vec<StringStore>,
    dicts: Vec<DictStore>,
}

impl Heap {
    fn marks(&self) -> HeapMarks {
        HeapMarks {
            arrays: self.arrays.len(),
            strings: self.strings.len(),
            dicts: self.dicts.len(),
        }
    }

    fn truncate(&mut self, marks: HeapMarks) {
        self.arrays.truncate(marks.arrays);
        self.strings.truncate(marks.strings);
        self.dicts.truncate(marks.dicts);
    }

    fn composite_count(&self) -> usize {
        self.arrays.len() + self.strings.len() + self.dicts.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapMarks {
    arrays: usize,
    strings: usize,
    dicts: usize,
}

/// A `save` snapshot. Composites that existed at save time are protected:
/// their first mutation afterward copies the backing store into the undo log.
/// Composites allocated after the save are above the high-water marks and are
/// simply dropped on restore.
#[derive(Debug)]
pub struct SaveRecord {
    pub id: SaveId,
    local_marks: HeapMarks,
    global_marks: HeapMarks,

    /// Set by the job server on the save that opens an encapsulated job;
    /// restoring across it rolls global VM back too.
    pub job_boundary: bool,

    undo_arrays: HashMap<(bool, usize), ArrayStore>,
    undo_strings: HashMap<(bool, usize), StringStore>,
    undo_dicts: HashMap<(bool, usize), DictStore>,
}

/// The dual virtual memory: a per-context local heap and the process-wide
/// global heap, with the save stack that snapshots them.
#[derive(Debug, Default)]
pub struct Vm {
    local: Heap,
    global: Heap,
    saves: Vec<SaveRecord>,
    next_save_id: usize,

    /// Current allocation mode; `setglobal` toggles it.
    pub alloc_global: bool,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self, global: bool) -> &Heap {
        if global {
            &self.global
        } else {
            &self.local
        }
    }

    fn heap_mut(&mut self, global: bool) -> &mut Heap {
        if global {
            &mut self.global
        } else {
            &mut self.local
        }
    }

    // -- allocation ---------------------------------------------------------

    pub fn alloc_array(&mut self, objects: Vec<Object>) -> ArraySlice {
        let global = self.alloc_global;
        let len = objects.len();
        let heap = self.heap_mut(global);
        heap.arrays.push(ArrayStore::new(objects));
        ArraySlice {
            idx: ArrayIndex(heap.arrays.len() - 1),
            start: 0,
            len,
            global,
        }
    }

    pub fn alloc_string(&mut self, bytes: Vec<u8>) -> StringSlice {
        let global = self.alloc_global;
        let len = bytes.len();
        let heap = self.heap_mut(global);
        heap.strings.push(StringStore::new(bytes));
        StringSlice {
            idx: StringIndex(heap.strings.len() - 1),
            start: 0,
            len,
            global,
        }
    }

    pub fn alloc_dict(&mut self, capacity: usize) -> DictHandle {
        let global = self.alloc_global;
        let heap = self.heap_mut(global);
        heap.dicts.push(DictStore::with_capacity(capacity));
        DictHandle {
            idx: DictIndex(heap.dicts.len() - 1),
            global,
        }
    }

    /// Allocates in local VM regardless of the current mode. userdict and the
    /// job-control dictionaries always live locally.
    pub fn alloc_local_dict(&mut self, capacity: usize) -> DictHandle {
        let saved = self.alloc_global;
        self.alloc_global = false;
        let handle = self.alloc_dict(capacity);
        self.alloc_global = saved;
        handle
    }

    pub fn alloc_global_dict(&mut self, capacity: usize) -> DictHandle {
        let saved = self.alloc_global;
        self.alloc_global = true;
        let handle = self.alloc_dict(capacity);
        self.alloc_global = saved;
        handle
    }

    // -- read access --------------------------------------------------------

    pub fn array(&self, slice: ArraySlice) -> &[Object] {
        let store = &self.heap(slice.global).arrays[slice.idx.0];
        &store.as_slice()[slice.start..slice.start + slice.len]
    }

    pub fn string_bytes(&self, slice: StringSlice) -> &[u8] {
        let store = &self.heap(slice.global).strings[slice.idx.0];
        &store.as_bytes()[slice.start..slice.start + slice.len]
    }

    pub fn dict(&self, handle: DictHandle) -> &DictStore {
        &self.heap(handle.global).dicts[handle.idx.0]
    }

    // -- write access (copy-on-write bookkeeping) ---------------------------

    fn protect_array(&mut self, global: bool, idx: usize) {
        let Some(save) = self.saves.last_mut() else { return };
        let marks = if global { save.global_marks } else { save.local_marks };
        if idx >= marks.arrays || save.undo_arrays.contains_key(&(global, idx)) {
            return;
        }
        let copy = self.heap(global).arrays[idx].clone();
        self.saves
            .last_mut()
            .unwrap()
            .undo_arrays
            .insert((global, idx), copy);
    }

    fn protect_string(&mut self, global: bool, idx: usize) {
        let Some(save) = self.saves.last_mut() else { return };
        let marks = if global { save.global_marks } else { save.local_marks };
        if idx >= marks.strings || save.undo_strings.contains_key(&(global, idx)) {
            return;
        }
        let copy = self.heap(global).strings[idx].clone();
        self.saves
            .last_mut()
            .unwrap()
            .undo_strings
            .insert((global, idx), copy);
    }

    fn protect_dict(&mut self, global: bool, idx: usize) {
        let Some(save) = self.saves.last_mut() else { return };
        let marks = if global { save.global_marks } else { save.local_marks };
        if idx >= marks.dicts || save.undo_dicts.contains_key(&(global, idx)) {
            return;
        }
        let copy = self.heap(global).dicts[idx].clone();
        self.saves
            .last_mut()
            .unwrap()
            .undo_dicts
            .insert((global, idx), copy);
    }

    pub fn array_store_mut(&mut self, slice: ArraySlice) -> &mut ArrayStore {
        self.protect_array(slice.global, slice.idx.0);
        &mut self.heap_mut(slice.global).arrays[slice.idx.0]
    }

    /// The writable window of an array view.
    pub fn array_mut(&mut self, slice: ArraySlice) -> &mut [Object] {
        let store = self.array_store_mut(slice);
        let start = slice.start;
        &mut store.as_mut_slice()[start..start + slice.len]
    }

    pub fn string_mut(&mut self, slice: StringSlice) -> &mut [u8] {
        self.protect_string(slice.global, slice.idx.0);
        let store = &mut self.heap_mut(slice.global).strings[slice.idx.0];
        &mut store.as_mut_bytes()[slice.start..slice.start + slice.len]
    }

    pub fn dict_mut(&mut self, handle: DictHandle) -> &mut DictStore {
        self.protect_dict(handle.global, handle.idx.0);
        &mut self.heap_mut(handle.global).dicts[handle.idx.0]
    }

    // -- save / restore -----------------------------------------------------

    pub fn save(&mut self, job_boundary: bool) -> SaveId {
        let id = SaveId(self.next_save_id);
        self.next_save_id += 1;

        self.saves.push(SaveRecord {
            id,
            local_marks: self.local.marks(),
            global_marks: self.global.marks(),
            job_boundary,
            undo_arrays: HashMap::new(),
            undo_strings: HashMap::new(),
            undo_dicts: HashMap::new(),
        });

        id
    }

    pub fn save_level(&self) -> usize {
        self.saves.len()
    }

    pub fn is_valid_save(&self, id: SaveId) -> bool {
        self.saves.iter().any(|record| record.id == id)
    }

    /// Marks of the save `id`, for invalidrestore screening of live handles.
    pub fn save_marks(&self, id: SaveId) -> Option<(HeapMarks, HeapMarks)> {
        self.saves
            .iter()
            .find(|record| record.id == id)
            .map(|record| (record.local_marks, record.global_marks))
    }

    /// Whether a composite handle refers to a slot allocated after the save
    /// identified by `marks`. Such a handle still reachable from a stack makes
    /// the restore illegal.
    pub fn allocated_after(&self, obj: &Object, local_marks: HeapMarks, global_marks: HeapMarks) -> bool {
        let marks_for = |global: bool| if global { global_marks } else { local_marks };
        match &obj.value {
            Value::Array(a) | Value::PackedArray(a) => {
                !a.global && a.idx.0 >= marks_for(a.global).arrays
            }
            Value::String(s) => !s.global && s.idx.0 >= marks_for(s.global).strings,
            Value::Dict(d) => !d.global && d.idx.0 >= marks_for(d.global).dicts,
            _ => false,
        }
    }

    /// Rolls VM back to the snapshot `id`, popping every save above it.
    /// The caller has already validated the save and screened the stacks.
    pub fn restore(&mut self, id: SaveId) -> PsResult<()> {
        if !self.is_valid_save(id) {
            anyhow::bail!(ErrorKind::InvalidRestore);
        }

        loop {
            let record = self.saves.pop().expect("validated above");

            for ((global, idx), store) in record.undo_arrays {
                self.heap_mut(global).arrays[idx] = store;
            }
            for ((global, idx), store) in record.undo_strings {
                self.heap_mut(global).strings[idx] = store;
            }
            for ((global, idx), store) in record.undo_dicts {
                self.heap_mut(global).dicts[idx] = store;
            }

            self.local.truncate(record.local_marks);
            if record.job_boundary {
                self.global.truncate(record.global_marks);
            }

            if record.id == id {
                break;
            }
        }

        Ok(())
    }

    /// (level, used, maximum) for `vmstatus`. Used is a composite count scaled
    /// to look like bytes; the host allocator owns the real numbers.
    pub fn status(&self) -> (i32, i32, i32) {
        let used = (self.local.composite_count() + self.global.composite_count()) * 48;
        (self.saves.len() as i32, used as i32, i32::MAX)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_slice_windows_share_backing() {
        let mut vm = Vm::new();
        let s = vm.alloc_string(b"hello".to_vec());
        let window = StringSlice { start: 1, len: 3, ..s };

        vm.string_mut(window)[0] = b'E';

        assert_eq!(vm.string_bytes(s), b"hEllo");
        assert_eq!(vm.string_bytes(window), b"Ell");
    }

    #[test]
    fn restore_reinstates_mutated_composites() {
        let mut vm = Vm::new();
        let s = vm.alloc_string(b"abc".to_vec());

        let save = vm.save(false);
        vm.string_mut(s)[0] = b'X';
        assert_eq!(vm.string_bytes(s), b"Xbc");

        vm.restore(save).unwrap();
        assert_eq!(vm.string_bytes(s), b"abc");
    }

    #[test]
    fn restore_drops_composites_allocated_after_save() {
        let mut vm = Vm::new();
        let save = vm.save(false);
        let _ = vm.alloc_string(b"transient".to_vec());
        vm.restore(save).unwrap();

        // the arena slot is gone; the next allocation reuses it
        let fresh = vm.alloc_string(b"next".to_vec());
        assert_eq!(fresh.idx.0, 0);
    }

    #[test]
    fn nested_saves_each_keep_their_own_undo_copy() {
        let mut vm = Vm::new();
        let s = vm.alloc_string(b"v0".to_vec());

        let outer = vm.save(false);
        vm.string_mut(s).copy_from_slice(b"v1");
        let inner = vm.save(false);
        vm.string_mut(s).copy_from_slice(b"v2");

        vm.restore(inner).unwrap();
        assert_eq!(vm.string_bytes(s), b"v1");

        vm.restore(outer).unwrap();
        assert_eq!(vm.string_bytes(s), b"v0");
    }

    #[test]
    fn restore_to_outer_save_pops_inner_saves() {
        let mut vm = Vm::new();
        let s = vm.alloc_string(b"v0".to_vec());

        let outer = vm.save(false);
        vm.string_mut(s).copy_from_slice(b"v1");
        let inner = vm.save(false);
        vm.string_mut(s).copy_from_slice(b"v2");

        vm.restore(outer).unwrap();
        assert_eq!(vm.string_bytes(s), b"v0");
        assert!(!vm.is_valid_save(inner));
        assert_eq!(vm.save_level(), 0);
    }

    #[test]
    fn save_restore_without_mutation_is_noop() {
        let mut vm = Vm::new();
        let s = vm.alloc_string(b"stable".to_vec());
        let a = vm.alloc_array(vec![Object::int(1), Object::int(2)]);

        let save = vm.save(false);
        vm.restore(save).unwrap();

        assert_eq!(vm.string_bytes(s), b"stable");
        assert_eq!(vm.array(a), &[Object::int(1), Object::int(2)]);
    }

    #[test]
    fn restored_save_objects_become_invalid() {
        let mut vm = Vm::new();
        let save = vm.save(false);
        vm.restore(save).unwrap();
        assert!(vm.restore(save).is_err());
    }

    #[test]
    fn global_heap_survives_plain_restore() {
        let mut vm = Vm::new();
        vm.alloc_global = true;
        let g = vm.alloc_string(b"global".to_vec());
        vm.alloc_global = false;

        let save = vm.save(false);
        vm.string_mut(g)[0] = b'G';
        vm.restore(save).unwrap();

        // mutation undone (COW applies to global slots too), slot retained
        assert_eq!(vm.string_bytes(g), b"global");
        assert!(g.global);
    }
}
