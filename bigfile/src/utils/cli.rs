use clap::Parser;

use crate::utils::digest::DigestAlgorithm;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listening host
    #[arg(long, env = "BIGFILE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "BIGFILE_PORT", default_value_t = 7777)]
    pub port: u16,

    /// Root directory holding `temp/` (chunks) and `uploads/` (artifacts)
    #[arg(long, env = "BIGFILE_ROOTDIR", default_value = "/var/lib/bigfile")]
    pub root: String,

    /// Content digest algorithm clients claim (`md5` or `sha256`)
    #[arg(long, env = "BIGFILE_DIGEST", default_value = "md5")]
    pub digest: DigestAlgorithm,

    /// Largest accepted chunk body in bytes
    #[arg(long, env = "BIGFILE_MAX_CHUNK_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_chunk_bytes: usize,
}
