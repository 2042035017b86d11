use biosdump::{args, dump, source};
use biosdump::args::Args;
use biosdump::dump::Region;
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let argv: Vec<OsString> = std::env::args_os().collect();
    let exe = args::exe_name(&argv);

    // `/?` wins over everything else on the line, valid or not
    if args::wants_help(&argv) {
        print!("{}", args::usage(&exe));
        return;
    }

    let cli = match Args::try_parse_argv(&argv) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            // no full help here, so the actual problem stays visible
            let _ = e.print();
            println!("For help, run: {} /?", exe);
            process::exit(1);
        },
    };

    if cli.output.is_none() {
        println!("No output specified. Dumping in current directory as {}", args::DEFAULT_OUTPUT);
    }
    let path = cli.output_or_default();
    let region = Region::new(cli.offset.0, cli.size.0);

    // announced before the memory device is touched, so it shows even if that fails
    println!("{}", dump::describe(region, path));
    let result = source::open_source(&cli.mem)
        .and_then(|mut mem| dump::dump(&mut mem, region, path));

    if let Err(e) = result {
        println!("Error dumping BIOS: {:#}", e);
        process::exit(biosdump::exit_status(&e));
    }

    println!("BIOS dumped successfully :)");
}
