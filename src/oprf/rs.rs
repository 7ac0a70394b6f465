//! Implementation of the VOLE + OKVS oblivious PRF in the style of
//! Rindal-Schoppmann (cf. <https://eprint.iacr.org/2021/266>).
//!
//! The sender holds the PRF key `Δ`; on input `x` the PRF value is
//! `H2(x, Decode(K, x) ⊕ Δ·H1(x))` for the sender's combined vector
//! `K = B ⊕ Δ·A' = C ⊕ Δ·P`. For every `x` the receiver encoded into `P`,
//! `Decode(P, x) = H1(x)`, so the Δ-terms cancel and the receiver obtains
//! the same value as `H2(x, Decode(C, x))` — and learns nothing on any
//! other input.

use crate::{
    okvs::{Baxos, DenseType},
    vole::{VoleReceiver, VoleSender},
    AbstractChannel,
    Block,
    Error,
    AES_HASH,
};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

/// The OKVS row weight used by the OPRF.
const WEIGHT: usize = 3;

/// The OPRF input hash `H1`.
#[inline]
fn input_hash(x: Block) -> Block {
    AES_HASH.cr_hash(x)
}

/// The OPRF output hash `H2(x, w)`, with the transcript digest folded in
/// when running maliciously.
#[inline]
fn output_hash(x: Block, w: Block, digest: Block) -> Block {
    AES_HASH.cr_hash(w ^ x ^ digest)
}

/// Digest of the OKVS correction transcript, used by the malicious-mode
/// consistency check.
fn transcript_digest(correction: &[Block]) -> Block {
    let mut hasher = Sha256::new();
    for b in correction.iter() {
        hasher.update(b.as_ref());
    }
    let digest = hasher.finalize();
    Block::try_from_slice(&digest[..16]).unwrap_or_default()
}

struct SenderState {
    baxos: Baxos,
    k: Vec<Block>,
    delta: Block,
    digest: Block,
}

/// OPRF sender. After [`Sender::send`] completes, the PRF may be evaluated
/// on any input.
pub struct Sender<V: VoleSender> {
    vole: V,
    /// Target OKVS bin capacity.
    pub bin_size: usize,
    /// Statistical security parameter.
    pub ssp: usize,
    /// Run the transcript consistency check.
    pub malicious: bool,
    /// Re-decode the receiver's encoding in debug mode.
    pub debug: bool,
    state: Option<SenderState>,
}

impl<V: VoleSender> Sender<V> {
    /// Create an OPRF sender on top of the given VOLE provider.
    pub fn new(vole: V) -> Self {
        Self {
            vole,
            bin_size: 1 << 14,
            ssp: 40,
            malicious: false,
            debug: false,
            state: None,
        }
    }

    /// Run the send phase against a receiver holding `n` inputs.
    pub fn send<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        n: usize,
        rng: &mut RNG,
        reduced_rounds: bool,
    ) -> Result<(), Error> {
        let baxos = Baxos::new(
            n,
            self.bin_size,
            WEIGHT,
            self.ssp,
            DenseType::GF128,
            Block::default(),
        )?;
        let size = baxos.size();
        log::debug!(
            "oprf send: n = {}, {} bins of size {}",
            n,
            baxos.num_bins,
            baxos.params.size()
        );
        let share = self.vole.send(channel, size, rng, reduced_rounds)?;

        // Receive the receiver's correction A' = P ⊕ A and fold it into the
        // combined vector K = B ⊕ Δ·A' = C ⊕ Δ·P.
        let correction = channel.read_blocks(size)?;
        let digest = if self.malicious {
            transcript_digest(&correction)
        } else {
            Block::default()
        };
        let delta = share.delta;
        let mut k = share.b;
        for (k, a) in k.iter_mut().zip(correction.iter()) {
            *k ^= a.gf128_mul(delta);
        }
        if self.malicious {
            channel.write_block(&digest)?;
            channel.flush()?;
        }
        self.state = Some(SenderState {
            baxos,
            k,
            delta,
            digest,
        });
        Ok(())
    }

    /// Evaluate the PRF on a batch of inputs.
    pub fn eval(
        &self,
        inputs: &[Block],
        outputs: &mut [Block],
        num_threads: usize,
    ) -> Result<(), Error> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::ProtocolError("OPRF eval before send".to_string()))?;
        if outputs.len() != inputs.len() {
            return Err(Error::ShapeMismatch {
                expected: inputs.len(),
                got: outputs.len(),
            });
        }
        // outputs = Δ·H1(x), then the decode adds in Decode(K, x).
        for (o, x) in outputs.iter_mut().zip(inputs.iter()) {
            *o = input_hash(*x).gf128_mul(state.delta);
        }
        let mut baxos = state.baxos.clone();
        baxos.add_to_decode = true;
        baxos.decode(inputs, outputs, &state.k, num_threads)?;
        for (o, x) in outputs.iter_mut().zip(inputs.iter()) {
            *o = output_hash(*x, *o, state.digest);
        }
        Ok(())
    }

    /// Evaluate the PRF on a single input.
    pub fn eval_one(&self, x: Block) -> Result<Block, Error> {
        let mut out = [Block::default()];
        self.eval(&[x], &mut out, 1)?;
        Ok(out[0])
    }
}

/// OPRF receiver: learns the PRF on its inputs and nothing else.
pub struct Receiver<V: VoleReceiver> {
    vole: V,
    /// Target OKVS bin capacity; must match the sender's.
    pub bin_size: usize,
    /// Statistical security parameter.
    pub ssp: usize,
    /// Run the transcript consistency check.
    pub malicious: bool,
    /// Verify the encoding by re-decoding it.
    pub debug: bool,
}

impl<V: VoleReceiver> Receiver<V> {
    /// Create an OPRF receiver on top of the given VOLE provider.
    pub fn new(vole: V) -> Self {
        Self {
            vole,
            bin_size: 1 << 14,
            ssp: 40,
            malicious: false,
            debug: false,
        }
    }

    /// Run the receive phase, filling `outputs[i]` with the PRF value on
    /// `inputs[i]`. Inputs must be distinct.
    pub fn receive<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        inputs: &[Block],
        outputs: &mut [Block],
        rng: &mut RNG,
        num_threads: usize,
        reduced_rounds: bool,
    ) -> Result<(), Error> {
        if outputs.len() != inputs.len() {
            return Err(Error::ShapeMismatch {
                expected: inputs.len(),
                got: outputs.len(),
            });
        }
        let mut baxos = Baxos::new(
            inputs.len(),
            self.bin_size,
            WEIGHT,
            self.ssp,
            DenseType::GF128,
            Block::default(),
        )?;
        baxos.debug = self.debug;
        let size = baxos.size();
        let share = self.vole.receive(channel, size, rng, reduced_rounds)?;

        // Encode x ↦ H1(x) and mask the encoding with the VOLE share.
        let mut values = vec![Block::default(); inputs.len()];
        AES_HASH.cr_hash_blocks(inputs, &mut values);
        let mut p = vec![Block::default(); size];
        baxos.solve(inputs, &values, &mut p, None, num_threads)?;
        for (p, a) in p.iter_mut().zip(share.a.iter()) {
            *p ^= *a;
        }
        channel.write_blocks(&p)?;
        channel.flush()?;
        let digest = if self.malicious {
            transcript_digest(&p)
        } else {
            Block::default()
        };

        baxos.debug = false;
        baxos.decode(inputs, outputs, &share.c, num_threads)?;

        if self.malicious {
            let theirs = channel.read_block()?;
            if theirs != digest {
                return Err(Error::MaliciousCheckFailed);
            }
        }
        for (o, x) in outputs.iter_mut().zip(inputs.iter()) {
            *o = output_hash(*x, *o, digest);
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

    fn run_oprf(n: usize, malicious: bool, num_threads: usize) {
        let mut rng = AesRng::from_seed(Block::from(40u128));
        let inputs: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        let inputs_ = inputs.clone();
        let (s, r) = UnixStream::pair().unwrap();
        let handle = std::thread::spawn(move || {
            let mut rng = AesRng::from_seed(Block::from(41u128));
            let reader = BufReader::new(s.try_clone().unwrap());
            let writer = BufWriter::new(s);
            let mut channel = Channel::new(reader, writer);
            let mut sender = Sender::new(InsecureVoleSender);
            sender.bin_size = 1 << 10;
            sender.malicious = malicious;
            sender.send(&mut channel, n, &mut rng, false).unwrap();
            let mut outputs = vec![Block::default(); n];
            sender.eval(&inputs_, &mut outputs, num_threads).unwrap();
            // A fresh input evaluates without error.
            sender.eval_one(Block::from(999u128)).unwrap();
            outputs
        });
        let mut rng = AesRng::from_seed(Block::from(42u128));
        let reader = BufReader::new(r.try_clone().unwrap());
        let writer = BufWriter::new(r);
        let mut channel = Channel::new(reader, writer);
        let mut receiver = Receiver::new(InsecureVoleReceiver);
        receiver.bin_size = 1 << 10;
        receiver.malicious = malicious;
        let mut outputs = vec![Block::default(); n];
        receiver
            .receive(&mut channel, &inputs, &mut outputs, &mut rng, num_threads, false)
            .unwrap();
        let sender_outputs = handle.join().unwrap();
        assert_eq!(outputs, sender_outputs);
    }

    #[test]
    fn test_oprf_agreement() {
        run_oprf(1 << 12, false, 1);
    }

    #[test]
    fn test_oprf_agreement_threads() {
        run_oprf(1 << 12, false, 3);
    }

    #[test]
    fn test_oprf_malicious_mode() {
        run_oprf(1 << 10, true, 1);
    }

    #[test]
    fn test_eval_before_send() {
        let sender = Sender::new(InsecureVoleSender);
        assert!(matches!(
            sender.eval_one(Block::default()),
            Err(Error::ProtocolError(_))
        ));
    }
}
