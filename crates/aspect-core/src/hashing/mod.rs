//! Hash helpers – abstracción para permitir cambiar de algoritmo sin tocar el
//! resto del core.

use blake3::Hasher;

/// Hashea bytes y devuelve los primeros 8 bytes del digest como `u64`.
pub fn hash_u64(input: &[u8]) -> u64 {
    let mut h = Hasher::new();
    h.update(input);
    let digest = h.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
