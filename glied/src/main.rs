use std::num::ParseIntError;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use glied::{
    ArrayModel, ArrayletConfig, ElementShape, HeapFlags, ModelError, SnapshotBuffer,
    SnapshotConfigInfo,
};

/// Print the computed layout of one array object in a heap snapshot.
#[derive(Parser, Debug)]
#[command(name = "glied", version, about = "arraylet layout inspector")]
struct Args {
    /// Raw little-endian snapshot image. Without one, a small built-in
    /// demo image is inspected instead.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Address the image is mapped at.
    #[arg(long, value_parser = parse_hex, default_value = "10000")]
    base: u64,

    /// Array object address (hex); defaults to the image base.
    #[arg(long, value_parser = parse_hex)]
    object: Option<u64>,

    /// Arraylet leaf size in bytes; 0 disables arraylets.
    #[arg(long, default_value_t = 4096)]
    leaf_size: usize,

    /// Spine ceiling in bytes; 0 means unbounded.
    #[arg(long, default_value_t = 512)]
    spine_limit: usize,

    #[arg(long, default_value_t = 8)]
    pointer_size: usize,

    #[arg(long)]
    compressed_refs: bool,

    #[arg(long)]
    double_mapping: bool,

    #[arg(long)]
    regioned: bool,

    /// Layout algorithm revision recorded by the collector build.
    #[arg(long, default_value_t = 2)]
    algorithm_version: u32,

    /// log2 of the element byte size (2 for int, 3 for long).
    #[arg(long, default_value_t = 2)]
    element_shift: u32,

    /// Also resolve the address of this element.
    #[arg(long)]
    index: Option<u32>,
}

fn parse_hex(value: &str) -> Result<u64, ParseIntError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("glied: {error}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut flags = HeapFlags::empty();
    if args.double_mapping {
        flags |= HeapFlags::DOUBLE_MAPPING;
    }
    if args.regioned {
        flags |= HeapFlags::REGIONED;
    }

    let config = ArrayletConfig::new(SnapshotConfigInfo {
        leaf_size: (args.leaf_size != 0).then_some(args.leaf_size),
        largest_desirable_spine_size: (args.spine_limit != 0).then_some(args.spine_limit),
        pointer_size: Some(args.pointer_size),
        compressed_refs: args.compressed_refs,
        compressed_shift: args.compressed_refs.then_some(3),
        flags,
        data_addr_present: args.double_mapping,
        version_tag: args.algorithm_version,
        ..Default::default()
    })?;

    let snapshot = match &args.snapshot {
        Some(path) => SnapshotBuffer::new(args.base, std::fs::read(path)?),
        None => demo_image(args.base, &config),
    };
    let object = args.object.unwrap_or(args.base);
    let shape = ElementShape::primitive(args.element_shift)?;

    let model = ArrayModel::new(config);
    let geometry = model.geometry(&snapshot, object, shape)?;

    println!("array object at {:#x}", object);
    println!("  layout           {:?}", geometry.layout);
    println!("  elements         {}", geometry.element_count);
    println!("  data bytes       {}", geometry.data_size);
    println!("  arraylets        {}", geometry.number_of_arraylets);
    println!("  header bytes     {}", geometry.header_size);
    println!("  spine bytes      {}", geometry.spine_size);
    println!(
        "  footprint bytes  {}",
        model.total_footprint_with_header(&geometry)
    );
    println!(
        "  hashcode offset  {}",
        model.hashcode_offset(&snapshot, object, shape)?
    );
    if geometry.data_addr.is_some() {
        let verdict = if model.validate_data_addr(&geometry) {
            "consistent"
        } else {
            "INCONSISTENT"
        };
        println!("  data address     {}", verdict);
    }

    if let Some(index) = args.index {
        match model.element_address(&snapshot, &geometry, index) {
            Ok(address) => println!("  element {:<8} {:#x}", index, address),
            Err(ModelError::UninitializedLeaf { leaf_index, .. }) => {
                println!("  element {:<8} leaf {} not committed yet", index, leaf_index)
            }
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

/// A tiny synthetic heap: one discontiguous int array of 3000 elements
/// whose first two leaves are committed.
fn demo_image(base: u64, config: &ArrayletConfig) -> SnapshotBuffer {
    let mut image = SnapshotBuffer::zeroed(base, 0x10000);
    let reference = config.reference_size() as u64;

    // wide header: class slot, zero size field, real element count
    image.write_ref(base, 0xC1A55, config).expect("demo image write");
    image.write_u32(base + reference, 0).expect("demo image write");
    image
        .write_u32(base + reference + 4, 3000)
        .expect("demo image write");

    let arrayoid = base + config.discontiguous_header_size as u64;
    for (slot, leaf) in [(0u64, 0x2000u64), (1, 0x4000)] {
        image
            .write_ref(arrayoid + slot * reference, base + leaf, config)
            .expect("demo image write");
    }
    image
}
