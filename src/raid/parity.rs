//! XOR parity arithmetic.
//!
//! Single-parity RAID keeps, per stripe, one block equal to the XOR of all the stripe's data
//! blocks. XOR being its own inverse gives both maintenance and reconstruction: folding a block
//! into the parity twice removes it again, and folding every surviving member of a stripe
//! together yields the missing one.

use disk::BlockBuf;

/// XOR `src` into `buf`, in place.
pub fn xor(buf: &mut BlockBuf, src: &BlockBuf) {
    for (a, b) in buf.iter_mut().zip(src.iter()) {
        *a ^= *b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk::BLOCK_SIZE;

    fn pattern(seed: usize) -> BlockBuf {
        let mut buf = [0; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            buf[i] = (i * 7 + seed) as u8;
        }
        buf
    }

    #[test]
    fn self_inverse() {
        let mut buf = pattern(3);
        let copy = buf;

        xor(&mut buf, &copy);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_is_identity() {
        let mut buf = pattern(11);
        xor(&mut buf, &[0; BLOCK_SIZE]);
        assert_eq!(&buf[..], &pattern(11)[..]);
    }

    #[test]
    fn reconstructs_missing_member() {
        let members = [pattern(1), pattern(2), pattern(3), pattern(4)];

        // Parity over all members.
        let mut parity = [0; BLOCK_SIZE];
        for member in &members {
            xor(&mut parity, member);
        }

        // Any member equals the fold of the parity with the other members.
        for missing in 0..members.len() {
            let mut rebuilt = parity;
            for (i, member) in members.iter().enumerate() {
                if i != missing {
                    xor(&mut rebuilt, member);
                }
            }
            assert_eq!(&rebuilt[..], &members[missing][..]);
        }
    }
}
