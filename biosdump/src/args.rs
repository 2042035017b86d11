use clap::{Command, CommandFactory, FromArgMatches, Parser, error::ErrorKind};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// start of the motherboard BIOS window
pub const DEFAULT_BIOS_OFFSET: u32 = 0xF0000;

/// 64K, the whole F-segment
pub const DEFAULT_BIOS_SIZE: u32 = 0x10000;

/// output name used when none is given
pub const DEFAULT_OUTPUT: &str = "BIOS.BIN";

/// DOS-style help switch, honoured anywhere on the command line
pub const HELP_TOKEN: &str = "/?";

/// u32 that is read and shown in hex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hex(pub u32);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about, long_about = "Dump a window of physical memory (the BIOS by default) to a file.")]
#[command(args_override_self = true)]
pub struct Args {
    #[arg(
        short, long,
        value_name = "OFFSET",
        default_value_t = Hex(DEFAULT_BIOS_OFFSET),
        value_parser = parse_offset,
        help = "Memory offset to BIOS (hex, absolute address)."
    )]
    pub offset: Hex,

    #[arg(
        short, long,
        value_name = "SIZE",
        default_value_t = Hex(DEFAULT_BIOS_SIZE),
        value_parser = parse_size,
        help = "BIOS size (hex)."
    )]
    pub size: Hex,

    #[arg(short, long, value_name = "MEM", default_value = "/dev/mem", help = "Memory device or image to read from.")]
    pub mem: PathBuf,

    #[arg(value_name = "OUTPUT", help = "Output file [default: BIOS.BIN].")]
    pub output: Option<PathBuf>,
}

impl Args {
    /// parse a full argv (program name first)
    ///
    /// the output path is only ever the last token. Whatever sits there is
    /// taken as the path, dashes included, unless it is a flag or the value
    /// of the flag before it. A bare token anywhere else is rejected.
    pub fn try_parse_argv<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let mut cmd = Self::command();
        cmd.build();

        let trailing = ends_with_output(&cmd, &argv);
        if trailing {
            // hand it to clap after `--` so a leading dash is not read as a flag
            let output = argv.pop();
            argv.push("--".into());
            argv.extend(output);
        }

        let matches = cmd.try_get_matches_from_mut(&argv)?;
        let args = Self::from_arg_matches(&matches)?;

        if let (false, Some(output)) = (trailing, &args.output) {
            return Err(cmd.error(
                ErrorKind::UnknownArgument,
                format!("Unrecognised token: {}", output.display()),
            ));
        }

        Ok(args)
    }

    /// output path, falling back to BIOS.BIN in the current directory
    pub fn output_or_default(&self) -> &Path {
        self.output.as_deref().unwrap_or(Path::new(DEFAULT_OUTPUT))
    }
}

/// true when the last token is free to be the output path
fn ends_with_output(cmd: &Command, argv: &[OsString]) -> bool {
    let Some(last) = argv.len().checked_sub(1).filter(|&i| i > 0) else {
        return false;
    };

    // step over flags, skipping the value of each one that takes a value
    let mut i = 1;
    while i < last {
        i += if takes_value(cmd, &argv[i]) { 2 } else { 1 };
    }

    i == last && !is_flag(cmd, &argv[last])
}

/// `-x` / `--xyz` spellings of a flag
fn spellings(arg: &clap::Arg) -> impl Iterator<Item = String> + '_ {
    arg.get_short().map(|c| format!("-{}", c)).into_iter()
        .chain(arg.get_long().map(|l| format!("--{}", l)))
}

fn takes_value(cmd: &Command, tok: &OsStr) -> bool {
    cmd.get_arguments()
        .filter(|a| a.get_action().takes_values())
        .any(|a| spellings(a).any(|s| tok == s.as_str()))
}

fn is_flag(cmd: &Command, tok: &OsStr) -> bool {
    let tok = tok.to_string_lossy();
    cmd.get_arguments()
        .flat_map(spellings)
        .any(|s| tok == s || (s.starts_with("--") && tok.starts_with(&format!("{}=", s))))
}

/// true when `/?` appears anywhere after the program name
pub fn wants_help<S: AsRef<OsStr>>(argv: &[S]) -> bool {
    argv.iter().skip(1).any(|a| a.as_ref() == HELP_TOKEN)
}

/// usage text, rendered with the name the program was invoked as
pub fn usage(exe: &str) -> String {
    Args::command()
        .bin_name(exe.to_string())
        .render_help()
        .to_string()
}

/// file name of argv[0], without the directory part
pub fn exe_name<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.first()
        .and_then(|a| Path::new(a.as_ref()).file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// base-16 u32 consuming the whole token, `0x` prefix optional
pub fn parse_hex(s: &str) -> Option<u32> {
    let digits = s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    // from_str_radix would take a leading '+'
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn parse_offset(s: &str) -> Result<Hex, String> {
    parse_hex(s).map(Hex).ok_or_else(|| format!("Invalid offset specified: {}", s))
}

fn parse_size(s: &str) -> Result<Hex, String> {
    parse_hex(s).map(Hex).ok_or_else(|| format!("Invalid size specified: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_argv(std::iter::once("biosdump").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.offset, Hex(DEFAULT_BIOS_OFFSET));
        assert_eq!(args.size, Hex(DEFAULT_BIOS_SIZE));
        assert_eq!(args.mem, PathBuf::from("/dev/mem"));
        assert_eq!(args.output, None);
        assert_eq!(args.output_or_default(), Path::new("BIOS.BIN"));
    }

    #[test]
    fn offset_size_and_output() {
        let args = parse(&["-o", "1000", "-s", "20", "out.bin"]).unwrap();
        assert_eq!(args.offset, Hex(0x1000));
        assert_eq!(args.size, Hex(0x20));
        assert_eq!(args.output_or_default(), Path::new("out.bin"));
    }

    #[test]
    fn long_flags_and_mem() {
        let args = parse(&["--offset", "0xC0000", "--size", "8000", "-m", "img.bin", "vga.bin"]).unwrap();
        assert_eq!(args.offset, Hex(0xC0000));
        assert_eq!(args.size, Hex(0x8000));
        assert_eq!(args.mem, PathBuf::from("img.bin"));
    }

    #[test]
    fn invalid_size() {
        let err = parse(&["-s", "zzz", "out.bin"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert!(err.to_string().contains("Invalid size specified: zzz"));
    }

    #[test]
    fn invalid_offset() {
        let err = parse(&["-o", "F000G"]).unwrap_err();
        assert!(err.to_string().contains("Invalid offset specified: F000G"));
    }

    #[test]
    fn unknown_flag() {
        let err = parse(&["-x", "out.bin"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn output_must_be_last() {
        let err = parse(&["out.bin", "-s", "20"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert!(err.to_string().contains("Unrecognised token: out.bin"));
    }

    #[test]
    fn bare_token_before_last_is_rejected() {
        // the trailing `x` belongs to -m, so the leading `x` is a stray token
        let err = parse(&["x", "-m", "x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert!(err.to_string().contains("Unrecognised token: x"));
    }

    #[test]
    fn dashed_last_token_is_the_output() {
        let args = parse(&["-o", "1000", "-x"]).unwrap();
        assert_eq!(args.offset, Hex(0x1000));
        assert_eq!(args.output, Some(PathBuf::from("-x")));

        let args = parse(&["-x"]).unwrap();
        assert_eq!(args.output, Some(PathBuf::from("-x")));
    }

    #[test]
    fn known_flag_last_is_not_the_output() {
        let err = parse(&["out.bin", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = parse(&["-s"]).unwrap_err();
        assert_ne!(err.kind(), ErrorKind::UnknownArgument);

        let args = parse(&["-s", "20", "--offset=1000"]).unwrap();
        assert_eq!(args.offset, Hex(0x1000));
        assert_eq!(args.output, None);
    }

    #[test]
    fn repeated_flag_keeps_last_value() {
        let args = parse(&["-o", "1000", "-o", "2000", "-s", "1", "--size", "2", "out.bin"]).unwrap();
        assert_eq!(args.offset, Hex(0x2000));
        assert_eq!(args.size, Hex(0x2));
        assert_eq!(args.output, Some(PathBuf::from("out.bin")));
    }

    #[test]
    fn defaults_show_in_hex() {
        let help = usage("biosdump");
        assert!(help.contains("[default: F0000]"));
        assert!(help.contains("[default: 10000]"));
        assert_eq!(Hex(0xC801F).to_string(), "C801F");
    }

    #[test]
    fn help_token_anywhere() {
        assert!(wants_help(&["biosdump", "/?"]));
        assert!(wants_help(&["biosdump", "-s", "zzz", "/?", "out.bin"]));
        assert!(!wants_help(&["/?"]));
        assert!(!wants_help(&["biosdump", "out.bin"]));
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("F0000"), Some(0xF0000));
        assert_eq!(parse_hex("f0000"), Some(0xF0000));
        assert_eq!(parse_hex("0x10"), Some(0x10));
        assert_eq!(parse_hex("FFFFFFFF"), Some(u32::MAX));
        assert_eq!(parse_hex("100000000"), None);
        assert_eq!(parse_hex(""), None);
        assert_eq!(parse_hex("0x"), None);
        assert_eq!(parse_hex("+10"), None);
        assert_eq!(parse_hex("10 "), None);
    }

    #[test]
    fn exe_name_strips_dir() {
        assert_eq!(exe_name(&["/usr/local/bin/biosdump", "x"]), "biosdump");
        assert_eq!(exe_name::<&str>(&[]), "biosdump");
    }
}
