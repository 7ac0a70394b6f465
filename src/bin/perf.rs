//! Benchmarking and demo harness for the OKVS-based PSI.
//!
//! Runs both parties in-process over a unix socket pair, e.g.:
//!
//! ```text
//! perf --nns 16 --nnr 16 --nt 4 -v
//! ```

use clap::Parser;
use eyre::{eyre, Result};
use rand::Rng;
use rand_core::SeedableRng;
use sherbet::{
    okvs::{Baxos, DenseType},
    psi,
    vole::{InsecureVoleReceiver, InsecureVoleSender},
    AesRng,
    Block,
    Channel,
    TrackChannel,
};
use std::{
    io::{BufReader, BufWriter},
    os::unix::net::UnixStream,
    time::Instant,
};

#[derive(Parser)]
#[command(name = "perf", about = "OKVS PSI benchmarking harness")]
struct Args {
    /// log2 of both set sizes.
    #[arg(long = "nn", default_value_t = 10)]
    nn: u32,
    /// log2 of the sender set size (overrides --nn).
    #[arg(long = "nns")]
    nns: Option<u32>,
    /// log2 of the receiver set size (overrides --nn).
    #[arg(long = "nnr")]
    nnr: Option<u32>,
    /// Number of repetitions.
    #[arg(short = 't', long = "trials", default_value_t = 1)]
    trials: usize,
    /// Worker threads per party.
    #[arg(long = "nt", default_value_t = 1)]
    num_threads: usize,
    /// Run the malicious-mode transcript check.
    #[arg(short = 'm', long)]
    malicious: bool,
    /// Use the insecure seed-expanded VOLE. This harness ships no base-OT
    /// stack, so this is always the case; the flag silences the warning.
    #[arg(short = 'f', long = "fake-base")]
    fake_base: bool,
    /// Disable mask compression (send full 16-byte hashes).
    #[arg(long = "nc")]
    no_compress: bool,
    /// OKVS bin size.
    #[arg(long = "bs")]
    bin_size: Option<usize>,
    /// log2 of the OKVS bin size.
    #[arg(long = "lbs")]
    log_bin_size: Option<u32>,
    /// Fuse rounds where possible.
    #[arg(long = "rr")]
    reduced_rounds: bool,
    /// Verbosity (-v, -vv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
    /// Epsilon expansion parameter; reported only.
    #[arg(short = 'e', long, default_value_t = 0.01)]
    epsilon: f64,
    /// Also time a standalone OKVS encode/decode with this row weight.
    #[arg(short = 'w', long)]
    weight: Option<usize>,
}

const SSP: usize = 40;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if !args.fake_base {
        log::warn!("no base-OT stack is built in; using the insecure seed-expanded VOLE");
    }
    let ns = 1usize << args.nns.unwrap_or(args.nn);
    let nr = 1usize << args.nnr.unwrap_or(args.nn);
    let bin_size = args
        .bin_size
        .or(args.log_bin_size.map(|l| 1usize << l))
        .unwrap_or(1 << 14);

    println!("threads = {}", args.num_threads);
    println!("sender input size   = {}", ns);
    println!("receiver input size = {}", nr);
    if args.verbose > 0 {
        println!("bin size = {}, e = {}, malicious = {}", bin_size, args.epsilon, args.malicious);
    }

    if let Some(weight) = args.weight {
        bench_okvs(nr, bin_size, weight, args.num_threads)?;
    }

    let mut rng = AesRng::from_seed(Block::from(0u128));
    let sender_set: Vec<Block> = (0..ns).map(|_| rng.gen()).collect();
    let mut recver_set: Vec<Block> = (0..nr).map(|_| rng.gen()).collect();
    // Plant a known intersection so the output can be sanity checked.
    let overlap = ns.min(nr) / 2;
    recver_set[..overlap].copy_from_slice(&sender_set[..overlap]);

    for trial in 0..args.trials {
        let (s, r) = UnixStream::pair()?;
        let start = Instant::now();
        let sender_set = sender_set.clone();
        let args_ = PartyArgs {
            ns,
            nr,
            malicious: args.malicious,
            num_threads: args.num_threads,
            reduced_rounds: args.reduced_rounds,
            no_compress: args.no_compress,
            bin_size,
        };
        let handle = std::thread::spawn(move || -> Result<usize> {
            let mut rng = AesRng::from_seed(Block::from(1u128));
            let mut channel = TrackChannel::new(Channel::new(
                BufReader::new(s.try_clone()?),
                BufWriter::new(s),
            ));
            let mut psi = psi::Sender::new(
                InsecureVoleSender,
                args_.ns,
                args_.nr,
                SSP,
                args_.malicious,
                args_.num_threads,
                args_.reduced_rounds,
            );
            psi.oprf.bin_size = args_.bin_size;
            if args_.no_compress {
                psi.disable_compression();
            }
            psi.run(&sender_set, &mut channel, &mut rng)
                .map_err(|e| eyre!("sender failed: {}", e))?;
            Ok(channel.bytes_written())
        });

        let mut rng = AesRng::from_seed(Block::from(2u128));
        let mut channel = TrackChannel::new(Channel::new(
            BufReader::new(r.try_clone()?),
            BufWriter::new(r),
        ));
        let mut psi = psi::Receiver::new(
            InsecureVoleReceiver,
            args_.ns,
            args_.nr,
            SSP,
            args_.malicious,
            args_.num_threads,
            args_.reduced_rounds,
        );
        psi.oprf.bin_size = args_.bin_size;
        if args_.no_compress {
            psi.disable_compression();
        }
        psi.run(&recver_set, &mut channel, &mut rng)
            .map_err(|e| eyre!("receiver failed: {}", e))?;
        let sender_bytes = handle
            .join()
            .map_err(|_| eyre!("sender thread panicked"))??;
        let elapsed = start.elapsed();

        if psi.intersection.len() != overlap {
            return Err(eyre!(
                "bad intersection: got {}, expected {}",
                psi.intersection.len(),
                overlap
            ));
        }
        println!(
            "trial {}: {:?}, |intersection| = {}",
            trial,
            elapsed,
            psi.intersection.len()
        );
        if args.verbose > 0 {
            println!("the receiver sends {} bytes", channel.bytes_written());
            println!("the sender sends   {} bytes", sender_bytes);
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct PartyArgs {
    ns: usize,
    nr: usize,
    malicious: bool,
    num_threads: usize,
    reduced_rounds: bool,
    no_compress: bool,
    bin_size: usize,
}

/// Time a standalone Baxos encode/decode at the given row weight.
fn bench_okvs(n: usize, bin_size: usize, weight: usize, num_threads: usize) -> Result<()> {
    let mut rng = AesRng::from_seed(Block::from(3u128));
    let baxos = Baxos::new(n, bin_size, weight, SSP, DenseType::Binary, rng.gen())
        .map_err(|e| eyre!("bad OKVS parameters: {}", e))?;
    let keys: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
    let values: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
    let mut p = vec![Block::default(); baxos.size()];
    let start = Instant::now();
    baxos
        .solve(&keys, &values, &mut p, Some(rng.gen()), num_threads)
        .map_err(|e| eyre!("encode failed: {}", e))?;
    let encode = start.elapsed();
    let mut out = vec![Block::default(); n];
    let start = Instant::now();
    baxos
        .decode(&keys, &mut out, &p, num_threads)
        .map_err(|e| eyre!("decode failed: {}", e))?;
    let decode = start.elapsed();
    println!(
        "okvs: n = {}, weight = {}, size = {} ({:.3}x), encode {:?}, decode {:?}",
        n,
        weight,
        baxos.size(),
        baxos.size() as f64 / n as f64,
        encode,
        decode
    );
    Ok(())
}
