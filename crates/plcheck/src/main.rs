//! plcheck, a static analysis and typechecking engine for a PL/SQL-like
//! embedded procedural language.

extern crate plcheck;
extern crate pltree as pl;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;

use pl::hostsql::{CatalogEngine, Plan};

/// The external compiler's dump: the routine trees plus the catalog of
/// compiled SQL fragments they embed.
#[derive(Deserialize)]
struct Dump {
    routines: Vec<pl::ast::Routine>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    text: String,
    #[serde(flatten)]
    plan: Plan,
}

// ----------------------------------------------------------------------------
// Command-line interface

fn main() {
    // command-line args
    let mut input = None;
    let mut config_file = None;
    let mut json = false;

    let mut args = std::env::args();
    let _ = args.next(); // skip executable name
    while let Some(arg) = args.next() {
        if arg == "-V" || arg == "--version" {
            println!("plcheck {}", env!("CARGO_PKG_VERSION"));
            return;
        } else if arg == "-c" {
            config_file = Some(args.next().expect("must specify a file for -c"));
        } else if arg == "--json" {
            json = true;
        } else if input.is_none() {
            input = Some(std::path::PathBuf::from(arg));
        } else {
            eprintln!("unknown argument: {}", arg);
            return;
        }
    }

    let input = input.expect("must specify a routine dump to check");

    let mut context = pl::Context::default();
    if let Some(filepath) = config_file {
        context.force_config(filepath.as_ref());
    } else {
        context.autodetect_config(&input);
    }
    context.set_print_severity(Some(pl::Severity::Info));

    println!("============================================================");
    println!("Reading {}...\n", input.display());
    let file = std::fs::File::open(&input).expect("i/o error opening dump");
    let dump: Dump =
        serde_json::from_reader(std::io::BufReader::new(file)).expect("error parsing dump");

    let mut engine = CatalogEngine::new();
    for entry in dump.catalog {
        engine.register(entry.text, entry.plan);
    }

    plcheck::run_cli(&context, &engine, &dump.routines);

    println!("============================================================");
    let errors = context
        .errors()
        .iter()
        .filter(|each| each.severity() <= pl::Severity::Info)
        .count();
    println!("Found {} diagnostics", errors);

    if json {
        serde_json::to_writer(std::io::stdout().lock(), &json! {{
            "info": context.errors().iter().filter(|each| each.severity() == pl::Severity::Info).count(),
            "warning": context.errors().iter().filter(|each| each.severity() == pl::Severity::Warning).count(),
            "error": context.errors().iter().filter(|each| each.severity() == pl::Severity::Error).count(),
        }}).unwrap();
    }

    std::process::exit(if errors > 0 { 1 } else { 0 });
}
