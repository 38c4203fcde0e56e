// XOR every byte with `key[i % 4]`; applying it twice restores the input.
pub(crate) fn unmask(payload: &mut [u8], key: [u8; 4]) {
    #[cfg(all(target_arch = "x86_64", feature = "simd_masking"))]
    if is_x86_feature_detected!("avx2") {
        // SAFETY: avx2 support checked above
        unsafe { unmask_avx2(payload, key) };
        return;
    }

    unmask_bytes(payload, key);
}

fn unmask_bytes(payload: &mut [u8], key: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}

#[cfg(all(target_arch = "x86_64", feature = "simd_masking"))]
#[target_feature(enable = "avx2")]
#[allow(clippy::cast_possible_wrap)]
unsafe fn unmask_avx2(payload: &mut [u8], key: [u8; 4]) {
    use std::arch::x86_64::{
        __m256i, _mm256_loadu_si256, _mm256_set1_epi32, _mm256_storeu_si256, _mm256_xor_si256,
    };

    let key256 = unsafe { _mm256_set1_epi32(u32::from_le_bytes(key) as i32) };
    let mut blocks = payload.chunks_exact_mut(32);
    for block in &mut blocks {
        let ptr = block.as_mut_ptr().cast::<__m256i>();
        // SAFETY: block is exactly 32 bytes and unaligned loads/stores are used
        unsafe { _mm256_storeu_si256(ptr, _mm256_xor_si256(_mm256_loadu_si256(ptr), key256)) };
    }
    // 32 is a multiple of 4 so the key phase is unchanged for the tail
    unmask_bytes(blocks.into_remainder(), key);
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;

    #[test]
    fn known_vector() {
        // RFC 6455 5.7 masked "Hello"
        let mut data = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        unmask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(&data, b"Hello");
    }

    proptest! {
        #[test]
        fn masking_is_an_involution(
            payload in vec(any::<u8>(), 0..=125),
            key in any::<[u8; 4]>(),
        ) {
            let mut data = payload.clone();
            unmask(&mut data, key);
            unmask(&mut data, key);
            prop_assert_eq!(data, payload);
        }
    }
}
