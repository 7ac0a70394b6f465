//! Private set intersection from the VOLE + OKVS oblivious PRF.
//!
//! Both parties evaluate the OPRF on their sets; the sender streams its
//! outputs truncated to `mask_size` bytes, and the receiver reports the
//! indices of its inputs whose masked outputs collide.

use crate::{
    oprf,
    utils::{div_ceil, log2_ceil, Divider},
    vole::{VoleReceiver, VoleSender},
    AbstractChannel,
    Block,
    Error,
};
use itertools::Itertools;
use rand::{CryptoRng, Rng};
use rustc_hash::FxHashMap;

/// The number of bytes of each OPRF output compared across the two parties:
/// `min(ceil((ssp + log2(|S|·|R|)) / 8), 16)`, or the full block when
/// running maliciously.
pub fn compute_mask_size(
    sender_size: usize,
    recver_size: usize,
    ssp: usize,
    malicious: bool,
) -> usize {
    if malicious {
        16
    } else {
        let bits = ssp + log2_ceil(sender_size.saturating_mul(recver_size)) as usize;
        div_ceil(bits, 8).min(16)
    }
}

fn mask_block(mask_size: usize) -> Block {
    let mut mask = [0u8; 16];
    for b in mask.iter_mut().take(mask_size) {
        *b = 0xff;
    }
    Block::from(mask)
}

/// Private set intersection sender.
pub struct Sender<V: VoleSender> {
    /// The underlying OPRF; exposed so callers can tune the OKVS bin size.
    pub oprf: oprf::rs::Sender<V>,
    sender_size: usize,
    recver_size: usize,
    mask_size: usize,
    num_threads: usize,
    reduced_rounds: bool,
}

impl<V: VoleSender> Sender<V> {
    /// Configure a PSI sender holding `sender_size` items against a receiver
    /// holding `recver_size` items.
    pub fn new(
        vole: V,
        sender_size: usize,
        recver_size: usize,
        ssp: usize,
        malicious: bool,
        num_threads: usize,
        reduced_rounds: bool,
    ) -> Self {
        let mut oprf = oprf::rs::Sender::new(vole);
        oprf.ssp = ssp;
        oprf.malicious = malicious;
        Self {
            oprf,
            sender_size,
            recver_size,
            mask_size: compute_mask_size(sender_size, recver_size, ssp, malicious),
            num_threads,
            reduced_rounds,
        }
    }

    /// The mask width in bytes.
    pub fn mask_size(&self) -> usize {
        self.mask_size
    }

    /// Disable mask compression, sending full 16-byte OPRF outputs.
    pub fn disable_compression(&mut self) {
        self.mask_size = 16;
    }

    /// Run the protocol over `inputs`.
    pub fn run<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        inputs: &[Block],
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<(), Error> {
        if inputs.len() != self.sender_size {
            return Err(Error::ShapeMismatch {
                expected: self.sender_size,
                got: inputs.len(),
            });
        }
        self.oprf
            .send(channel, self.recver_size, rng, self.reduced_rounds)?;

        let mut hashes = vec![Block::default(); inputs.len()];
        self.oprf.eval(inputs, &mut hashes, self.num_threads)?;
        log::debug!(
            "psi send: streaming {} masked hashes of {} bytes",
            hashes.len(),
            self.mask_size
        );

        if self.mask_size == 16 {
            channel.write_blocks(&hashes)?;
        } else {
            let mask_size = self.mask_size;
            let buf = hashes
                .iter()
                .flat_map(|h| h.as_ref()[..mask_size].iter().copied())
                .collect_vec();
            channel.write_bytes(&buf)?;
        }
        channel.flush()?;
        Ok(())
    }
}

/// Private set intersection receiver.
pub struct Receiver<V: VoleReceiver> {
    /// The underlying OPRF; exposed so callers can tune the OKVS bin size.
    pub oprf: oprf::rs::Receiver<V>,
    sender_size: usize,
    recver_size: usize,
    mask_size: usize,
    num_threads: usize,
    reduced_rounds: bool,
    /// The indices of the receiver's inputs found in the sender's set,
    /// filled by [`Receiver::run`]. Ordering is not canonical; sort if a
    /// canonical form is needed.
    pub intersection: Vec<u64>,
}

impl<V: VoleReceiver> Receiver<V> {
    /// Configure a PSI receiver; the sizes and flags must match the
    /// sender's.
    pub fn new(
        vole: V,
        sender_size: usize,
        recver_size: usize,
        ssp: usize,
        malicious: bool,
        num_threads: usize,
        reduced_rounds: bool,
    ) -> Self {
        let mut oprf = oprf::rs::Receiver::new(vole);
        oprf.ssp = ssp;
        oprf.malicious = malicious;
        Self {
            oprf,
            sender_size,
            recver_size,
            mask_size: compute_mask_size(sender_size, recver_size, ssp, malicious),
            num_threads,
            reduced_rounds,
            intersection: Vec::new(),
        }
    }

    /// The mask width in bytes.
    pub fn mask_size(&self) -> usize {
        self.mask_size
    }

    /// Disable mask compression; must match the sender.
    pub fn disable_compression(&mut self) {
        self.mask_size = 16;
    }

    /// Run the protocol over `inputs`, filling `self.intersection`.
    pub fn run<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        inputs: &[Block],
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<(), Error> {
        if inputs.len() != self.recver_size {
            return Err(Error::ShapeMismatch {
                expected: self.recver_size,
                got: inputs.len(),
            });
        }
        self.intersection.clear();

        let mut my_hashes = vec![Block::default(); inputs.len()];
        self.oprf.receive(
            channel,
            inputs,
            &mut my_hashes,
            rng,
            self.num_threads,
            self.reduced_rounds,
        )?;

        let mask = mask_block(self.mask_size);
        let nbytes = self.sender_size * self.mask_size;
        if self.num_threads < 2 {
            let mut map: FxHashMap<u128, u64> =
                FxHashMap::with_capacity_and_hasher(my_hashes.len(), Default::default());
            for (i, h) in my_hashes.iter().enumerate() {
                map.entry(u128::from(*h & mask)).or_insert(i as u64);
            }
            let theirs = channel.read_vec(nbytes)?;
            let mut h = [0u8; 16];
            for chunk in theirs.chunks_exact(self.mask_size) {
                h[..self.mask_size].copy_from_slice(chunk);
                if let Some(&i) = map.get(&u128::from_le_bytes(h)) {
                    self.intersection.push(i);
                }
            }
        } else {
            self.run_multi_threaded(channel, &my_hashes, mask, nbytes)?;
        }
        log::debug!("psi receive: |intersection| = {}", self.intersection.len());
        Ok(())
    }

    /// The multi-threaded lookup path: both the map build and the probe are
    /// sharded by the low 32 bits of the masked hash, and the map build
    /// overlaps the network receive.
    fn run_multi_threaded<C: AbstractChannel>(
        &mut self,
        channel: &mut C,
        my_hashes: &[Block],
        mask: Block,
        nbytes: usize,
    ) -> Result<(), Error> {
        let t_count = self.num_threads;
        let divider = Divider::new(t_count as u64);
        let per_thread = my_hashes.len() / t_count + 1;

        let mut theirs = vec![0u8; nbytes];
        let mut maps: Vec<FxHashMap<u128, u64>> = Vec::new();
        let mut recv_err: Option<Error> = None;
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..t_count)
                .map(|t| {
                    s.spawn(move || {
                        let mut map: FxHashMap<u128, u64> =
                            FxHashMap::with_capacity_and_hasher(per_thread, Default::default());
                        for (i, h) in my_hashes.iter().enumerate() {
                            let masked = *h & mask;
                            if divider.rem(masked.low_u32() as u64) as usize == t {
                                map.entry(u128::from(masked)).or_insert(i as u64);
                            }
                        }
                        map
                    })
                })
                .collect();
            if let Err(e) = channel.read_bytes(&mut theirs) {
                recv_err = Some(e.into());
            }
            maps = handles
                .into_iter()
                .map(|h| h.join().unwrap_or_default())
                .collect();
        });
        if let Some(e) = recv_err {
            return Err(e);
        }

        let mask_size = self.mask_size;
        let mut hits: Vec<Vec<u64>> = Vec::new();
        std::thread::scope(|s| {
            let handles: Vec<_> = maps
                .iter()
                .enumerate()
                .map(|(t, map)| {
                    let theirs = &theirs;
                    s.spawn(move || {
                        let mut found = Vec::new();
                        let mut h = [0u8; 16];
                        for chunk in theirs.chunks_exact(mask_size) {
                            h[..mask_size].copy_from_slice(chunk);
                            let v = u128::from_le_bytes(h);
                            if divider.rem(v as u32 as u64) as usize == t {
                                if let Some(&i) = map.get(&v) {
                                    found.push(i);
                                }
                            }
                        }
                        found
                    })
                })
                .collect();
            hits = handles
                .into_iter()
                .map(|h| h.join().unwrap_or_default())
                .collect();
        });
        // Merge in thread order: thread 0's hits first, then thread 1, and
        // so on; within a thread, the sender's transmission order.
        for found in hits.into_iter() {
            self.intersection.extend(found);
        }
        Ok(())
    }
}

impl<V: VoleSender> crate::SemiHonest for Sender<V> {}
impl<V: VoleReceiver> crate::SemiHonest for Receiver<V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        vole::{InsecureVoleReceiver, InsecureVoleSender},
        AesRng,
        Channel,
    };
    use rand::Rng;
    use rand_core::SeedableRng;
    use std::{
        io::{BufReader, BufWriter},
        os::unix::net::UnixStream,
    };

    const SSP: usize = 40;

    fn run_psi(
        sender_set: Vec<Block>,
        recver_set: Vec<Block>,
        malicious: bool,
        num_threads: usize,
    ) -> Vec<u64> {
        let ns = sender_set.len();
        let nr = recver_set.len();
        let (s, r) = UnixStream::pair().unwrap();
        let handle = std::thread::spawn(move || {
            let mut rng = AesRng::from_seed(Block::from(50u128));
            let reader = BufReader::new(s.try_clone().unwrap());
            let writer = BufWriter::new(s);
            let mut channel = Channel::new(reader, writer);
            let mut psi = Sender::new(
                InsecureVoleSender,
                ns,
                nr,
                SSP,
                malicious,
                num_threads,
                false,
            );
            psi.oprf.bin_size = 1 << 12;
            psi.run(&sender_set, &mut channel, &mut rng).unwrap();
        });
        let mut rng = AesRng::from_seed(Block::from(51u128));
        let reader = BufReader::new(r.try_clone().unwrap());
        let writer = BufWriter::new(r);
        let mut channel = Channel::new(reader, writer);
        let mut psi = Receiver::new(
            InsecureVoleReceiver,
            ns,
            nr,
            SSP,
            malicious,
            num_threads,
            false,
        );
        psi.oprf.bin_size = 1 << 12;
        psi.run(&recver_set, &mut channel, &mut rng).unwrap();
        handle.join().unwrap();
        psi.intersection.clone()
    }

    fn sets_with_intersection(
        rng: &mut AesRng,
        n: usize,
        overlap: usize,
    ) -> (Vec<Block>, Vec<Block>, Vec<u64>) {
        let sender_set: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        let mut recver_set: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        let mut expected = Vec::new();
        for k in 0..overlap {
            let idx = 3 * k + 1;
            recver_set[idx] = sender_set[2 * k];
            expected.push(idx as u64);
        }
        (sender_set, recver_set, expected)
    }

    #[test]
    fn test_psi_known_intersection() {
        let mut rng = AesRng::from_seed(Block::from(52u128));
        let n = 1 << 14;
        let (s, r, expected) = sets_with_intersection(&mut rng, n, 100);
        let mut got = run_psi(s, r, false, 1);
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_psi_empty_intersection() {
        let mut rng = AesRng::from_seed(Block::from(53u128));
        let n = 1 << 14;
        let s: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        let r: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        let got = run_psi(s, r, false, 1);
        assert!(got.is_empty());
    }

    #[test]
    fn test_psi_multi_threaded() {
        let mut rng = AesRng::from_seed(Block::from(54u128));
        let n = 1 << 13;
        let (s, r, expected) = sets_with_intersection(&mut rng, n, 64);
        let mut got = run_psi(s, r, false, 3);
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_psi_malicious_mode() {
        let mut rng = AesRng::from_seed(Block::from(55u128));
        let n = 1 << 12;
        let (s, r, expected) = sets_with_intersection(&mut rng, n, 32);
        let mut got = run_psi(s, r, true, 1);
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_mask_size() {
        assert_eq!(compute_mask_size(1 << 14, 1 << 14, 40, false), 9);
        assert_eq!(compute_mask_size(1 << 14, 1 << 14, 40, true), 16);
        assert_eq!(compute_mask_size(1 << 20, 1 << 20, 128, false), 16);
    }
}
