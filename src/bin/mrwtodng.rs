
//! Convert Minolta raw (MRW) files to digital negatives (DNG).

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use mrwdng::prelude::*;


#[derive(Parser, Debug)]
#[command(name = "mrwtodng", version)]
#[command(about = "Convert Minolta raw (MRW) files to digital negatives (DNG)")]
struct Args {

    /// Compress the raw image data (default).
    #[arg(short = 'c', long, overrides_with = "no_compress")]
    compress: bool,

    /// Do not compress the raw image data.
    #[arg(short = 'C', long, overrides_with = "compress")]
    no_compress: bool,

    /// Break compressed data into tiles (default).
    #[arg(short = 't', long, overrides_with = "no_tile")]
    tile: bool,

    /// Compress the entire data as one block.
    #[arg(short = 'T', long, overrides_with = "tile")]
    no_tile: bool,

    /// The maximum width of all the tiles.
    #[arg(short = 'w', long, value_name = "UNS", default_value_t = 256)]
    tile_width: u32,

    /// The maximum height of all the tiles.
    #[arg(short = 'H', long, value_name = "UNS", default_value_t = 256)]
    tile_height: u32,

    /// Use one shared huffman table for both bayer sample lanes
    /// instead of one table per lane.
    #[arg(long)]
    single_table: bool,

    /// The mrw file to read.
    source: PathBuf,

    /// The dng file to create.
    destination: PathBuf,
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let options = ConvertOptions {
        compression:
            if args.no_compress { Compression::Uncompressed }
            else { Compression::LosslessJpeg },

        tiling:
            if args.no_tile { Tiling::SingleStrip }
            else { Tiling::Tiles { width: args.tile_width, height: args.tile_height } },

        tables:
            if args.single_table { TableMode::Single }
            else { TableMode::PerLane },
    };

    if let Err(error) = dng::convert_file(&args.source, &args.destination, &options) {
        eprintln!("mrwtodng: {}", error);

        exit(match error {
            Error::Io(_) => 2,
            _ => 1,
        });
    }
}
