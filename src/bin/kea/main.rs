//! kea-cli - Tool for inspecting and repairing KEA containers.

use std::env;
use std::process;

use geoh5::kea::{self, ColumnData, Container, OpenMode};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "warn";
    let mut json = false;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "--json" => json = true,
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "info" | "i" => match filtered_args.get(1) {
            Some(path) => cmd_info(path, json),
            None => usage("kea-cli info <file> [--json]"),
        },
        "rewrite-strings" | "rw" => match filtered_args.get(1) {
            Some(path) => cmd_rewrite(path),
            None => usage("kea-cli rewrite-strings <file>"),
        },
        "rat" | "r" => match (filtered_args.get(1), filtered_args.get(2)) {
            (Some(path), Some(band)) => match band.parse::<usize>() {
                Ok(band) => cmd_rat(path, band, json),
                Err(_) => usage("kea-cli rat <file> <band>"),
            },
            _ => usage("kea-cli rat <file> <band>"),
        },
        "version" => {
            println!(
                "kea-cli {} (built {} {})",
                env!("CARGO_PKG_VERSION"),
                env!("GEOH5_BUILD_DATE"),
                env!("GEOH5_BUILD_TIME")
            );
            Ok(())
        }
        "h" | "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        // A bare file path is shorthand for `info`
        path if path.ends_with(".kea") => cmd_info(path, json),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn usage(text: &str) -> geoh5::Result<()> {
    eprintln!("Error: missing argument");
    eprintln!("Usage: {}", text);
    process::exit(2);
}

fn print_help() {
    println!("kea-cli - KEA raster container toolkit");
    println!();
    println!("USAGE:");
    println!("    kea-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info             <file>          Show size, geo-referencing and bands");
    println!("    rw, rewrite-strings <file>          Convert fixed-length text to variable-length");
    println!("    r, rat              <file> <band>   Print the attribute table of a band");
    println!("    version                             Show version and build date");
    println!("    h, help                             Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!("    --json           Print info and rat output as JSON");
    println!();
    println!("NOTES:");
    println!("    - Passing a .kea file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides the verbosity flags");
}

fn cmd_info(path: &str, json: bool) -> geoh5::Result<()> {
    tracing::debug!(path, "opening container");
    let c = Container::open(path, OpenMode::Read)?;
    let layout = c.layout()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*layout).map_err(std::io::Error::from)?);
        return Ok(());
    }

    println!("File:      {}", path);
    println!("Format:    {} {} ({})", layout.filetype, layout.version, layout.generator);
    println!("Size:      {} x {}", layout.width, layout.height);
    println!("Transform: {:?}", layout.transform.to_gdal());
    if !layout.crs_wkt.is_empty() {
        println!("CRS:       {}", layout.crs_wkt);
    }
    println!();
    println!("Bands: {}", layout.count());
    for band in &layout.bands {
        let name = band.name.as_deref().unwrap_or("");
        println!("  {:>3}  {:<8} {:<20} {}", band.index, band.dtype, name, band.layer_type);
        if let Some((rows, cols)) = band.chunks {
            println!("       chunks {}x{}, compression {}", rows, cols, band.compression);
        }
        if let Some(nd) = band.no_data {
            println!("       no data {:?}", nd);
        }
        if !band.description.is_empty() {
            println!("       {}", band.description);
        }
        if let Some(rat) = &band.rat {
            println!("       attribute table: {} rows, {} columns", rat.rows, rat.columns.len());
        }
    }
    if layout.count() > 1 {
        println!();
        println!("Promoted type: {}", layout.dtype()?);
    }
    Ok(())
}

fn cmd_rewrite(path: &str) -> geoh5::Result<()> {
    let n = kea::rewrite_strings(path)?;
    println!("Converted {} text datasets in {}", n, path);
    Ok(())
}

fn cmd_rat(path: &str, band: usize, json: bool) -> geoh5::Result<()> {
    let c = Container::open(path, OpenMode::Read)?;
    let table = c.read_rat(band, None, 0, None)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table).map_err(std::io::Error::from)?);
        return Ok(());
    }

    let header: Vec<&str> = table.columns.iter().map(|col| col.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in 0..table.rows() {
        let cells: Vec<String> = table
            .columns
            .iter()
            .map(|col| match &col.data {
                ColumnData::Bool(v) => v[row].to_string(),
                ColumnData::Int(v) => v[row].to_string(),
                ColumnData::Float(v) => v[row].to_string(),
                ColumnData::String(v) => v[row].clone(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    Ok(())
}
