use std::{error::Error, fs::File, io::Write};

use prjfabric_memory::{Design, SourceTable};
use prjfabric_opt::DualPortOptions;

struct Options {
    no_compact: bool,
    no_split: bool,
    dual_port: String,
    allow_lut: bool,
    max_lut_bytes: u64,
}

fn process(design: &mut Design, options: &Options) {
    if !options.no_compact {
        prjfabric_opt::compact(design);
    }
    if !options.no_split {
        let resolver = SourceTable::collect(design);
        prjfabric_opt::split_memories(design, &resolver);
    }
    let dual_port = DualPortOptions {
        allow_lut: options.allow_lut,
        max_lut_bytes: options.max_lut_bytes,
        suppress: false,
    };
    match options.dual_port.as_str() {
        "contexts" => prjfabric_opt::balance_contexts(design, &dual_port),
        "reads" => prjfabric_opt::balance_reads(design, &dual_port),
        "off" => (),
        other => panic!("unknown dual port mode {other:?}"),
    }
}

fn read_input(name: String) -> Result<Design, Box<dyn Error>> {
    if name.ends_with(".fab") {
        Ok(prjfabric_memory::parse(&std::fs::read_to_string(name)?)?)
    } else if name.is_empty() {
        panic!("no input provided")
    } else {
        panic!("don't know what to do with input {name:?}")
    }
}

fn write_output(design: Design, name: String) -> Result<(), Box<dyn Error>> {
    if name.ends_with(".fab") {
        write!(&mut File::create(name)?, "{design}")?;
    } else if name.is_empty() {
        print!("{design}");
        println!("; design statistics:");
        for (class, amount) in design.statistics() {
            println!("; {:>7} {}", amount, class);
        }
    } else {
        panic!("don't know what to do with output {name:?}")
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut version = false;
    let mut options = Options {
        no_compact: false,
        no_split: false,
        dual_port: String::from("contexts"),
        allow_lut: false,
        max_lut_bytes: 64,
    };
    let mut input = String::new();
    let mut output = String::new();
    {
        let mut parser = argparse::ArgumentParser::new();
        parser.refer(&mut version).add_option(&["--version"], argparse::StoreTrue, "Display version");
        parser.refer(&mut options.no_compact).add_option(
            &["--no-compact"],
            argparse::StoreTrue,
            "Skip memory compaction",
        );
        parser.refer(&mut options.no_split).add_option(
            &["--no-split"],
            argparse::StoreTrue,
            "Skip memory splitting",
        );
        parser.refer(&mut options.dual_port).add_option(
            &["--dual-port"],
            argparse::Store,
            "Dual port allocation: contexts, reads or off",
        );
        parser.refer(&mut options.allow_lut).add_option(
            &["--allow-lut-dual-port"],
            argparse::StoreTrue,
            "Allocate a second port on LUT memories too",
        );
        parser.refer(&mut options.max_lut_bytes).add_option(
            &["--max-lut-bytes"],
            argparse::Store,
            "Largest memory expected to become a LUT",
        );
        parser.refer(&mut input).add_argument("INPUT", argparse::Store, "Input file");
        parser.refer(&mut output).add_argument("OUTPUT", argparse::Store, "Output file");
        parser.parse_args_or_exit();
    }

    if version {
        println!("prjfabric git-{}", env!("GIT_HASH"));
        return Ok(());
    }

    let mut design = read_input(input)?;
    process(&mut design, &options);
    write_output(design, output)?;
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1)
    }
}
