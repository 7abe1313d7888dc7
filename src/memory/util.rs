// Allocates an array of uninitialized data, for the arena's slab storage.
pub unsafe fn alloc_array<T: Sized>(len: usize) -> Box<[T]> {
    // Allocate the space using vector (I know I know...)
    let mut array = Vec::with_capacity(len);
    array.set_len(len);
    array.into_boxed_slice()
}
