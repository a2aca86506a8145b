use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::env;

use chrono::{DateTime, Local};
use log::{debug, info};

mod bits;
mod dynamic;
mod error;
mod gzip;
mod huffman;
mod inflate;
mod unzip;

#[cfg(test)]
mod test_utils;

use error::{GzipError, GzipResult};
use gzip::{original_size, GzipHeader};
use unzip::{unzip, Unzipped};

const OK: i32 = 0;
const ERROR: i32 = 1;
const WARNING: i32 = 2;

const Z_SUFFIX: &str = ".gz";
const MAX_SUFFIX: usize = 30;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const LICENSE_MSG: &[&str] = &[
    "This is free software.  You may redistribute copies of it under the terms of",
    "the GNU General Public License <http://www.gnu.org/licenses/gpl.html>.",
    "There is NO WARRANTY, to the extent permitted by law.",
];

const HELP_MSG: &[&str] = &[
    "Decompress FILEs compressed with dynamic-Huffman DEFLATE (by default, in-place).",
    "",
    "Mandatory arguments to long options are mandatory for short options too.",
    "",
    "  -c, --stdout      write on standard output, keep original files unchanged",
    "  -d, --decompress  decompress (always on)",
    "  -f, --force       force overwrite of output file and read from a terminal",
    "  -h, --help        give this help",
    "  -k, --keep        keep (don't delete) input files",
    "  -l, --list        list compressed file contents",
    "  -L, --license     display software license",
    "  -n, --no-name     do not restore the original name and time stamp",
    "  -N, --name        restore the original name and time stamp",
    "  -q, --quiet       suppress all warnings",
    "  -S, --suffix=SUF  use suffix SUF on compressed files",
    "  -t, --test        test compressed file integrity",
    "  -v, --verbose     verbose mode",
    "  -V, --version     display version number",
    "",
    "With no FILE, or when FILE is -, read standard input.",
    "The GZIP environment variable may hold default options.",
];

/// Command line options, fixed once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    to_stdout: bool,
    force: u32,
    keep: bool,
    list: bool,
    restore_name: bool,
    restore_time: bool,
    quiet: bool,
    verbose: u32,
    test: bool,
    suffix: String,
    help: bool,
    version: bool,
    license: bool,
    files: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            to_stdout: false,
            force: 0,
            keep: false,
            list: false,
            restore_name: false,
            restore_time: false,
            quiet: false,
            verbose: 0,
            test: false,
            suffix: Z_SUFFIX.to_string(),
            help: false,
            version: false,
            license: false,
            files: Vec::new(),
        }
    }
}

impl Options {
    /// Parses `args` (without the program name).
    fn parse<I: IntoIterator<Item = String>>(args: I) -> GzipResult<Options> {
        let mut opts = Options::default();
        let mut arg_iter = args.into_iter();
        let mut only_files = false;

        while let Some(arg) = arg_iter.next() {
            if only_files || arg == "-" || !arg.starts_with('-') {
                opts.files.push(arg);
                continue;
            }
            if arg == "--" {
                only_files = true;
                continue;
            }
            if let Some(long) = arg.strip_prefix("--") {
                let (name, value) = match long.split_once('=') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (long, None),
                };
                match name {
                    "suffix" => {
                        opts.suffix = match value {
                            Some(v) => v,
                            None => arg_iter
                                .next()
                                .ok_or_else(|| GzipError::invalid_argument("option '--suffix' requires an argument"))?,
                        }
                    }
                    _ if value.is_some() => {
                        return Err(GzipError::invalid_argument(format!("option '--{}' doesn't allow an argument", name)))
                    }
                    "stdout" | "to-stdout" => opts.to_stdout = true,
                    "decompress" | "uncompress" => {}
                    "force" => opts.force += 1,
                    "help" => opts.help = true,
                    "keep" => opts.keep = true,
                    "list" => opts.list = true,
                    "license" => opts.license = true,
                    "no-name" => opts.set_name(false),
                    "name" => opts.set_name(true),
                    "quiet" => opts.set_quiet(),
                    "test" => opts.test = true,
                    "verbose" => opts.set_verbose(),
                    "version" => opts.version = true,
                    _ => return Err(GzipError::invalid_argument(format!("unrecognized option '{}'", arg))),
                }
                continue;
            }

            let flags: Vec<char> = arg[1..].chars().collect();
            let mut i = 0;
            while i < flags.len() {
                match flags[i] {
                    'c' => opts.to_stdout = true,
                    'd' => {}
                    'f' => opts.force += 1,
                    'h' | 'H' => opts.help = true,
                    'k' => opts.keep = true,
                    'l' => opts.list = true,
                    'L' => opts.license = true,
                    'n' => opts.set_name(false),
                    'N' => opts.set_name(true),
                    'q' => opts.set_quiet(),
                    't' => opts.test = true,
                    'v' => opts.set_verbose(),
                    'V' => opts.version = true,
                    // Compression levels mean nothing here.
                    '1'..='9' => {}
                    'S' => {
                        let rest: String = flags[i + 1..].iter().collect();
                        opts.suffix = if !rest.is_empty() {
                            rest
                        } else {
                            arg_iter
                                .next()
                                .ok_or_else(|| GzipError::invalid_argument("option requires an argument -- 'S'"))?
                        };
                        break;
                    }
                    c => return Err(GzipError::invalid_argument(format!("invalid option -- '{}'", c))),
                }
                i += 1;
            }
        }

        if opts.suffix.is_empty() || opts.suffix.len() > MAX_SUFFIX {
            return Err(GzipError::invalid_argument(format!("invalid suffix '{}'", opts.suffix)));
        }
        Ok(opts)
    }

    fn set_name(&mut self, restore: bool) {
        self.restore_name = restore;
        self.restore_time = restore;
    }

    fn set_quiet(&mut self) {
        self.quiet = true;
        self.verbose = 0;
    }

    fn set_verbose(&mut self) {
        self.verbose += 1;
        self.quiet = false;
    }

    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Options from the `GZIP` environment variable, placed before the real
/// command line.
fn env_args() -> Vec<String> {
    env::var("GZIP")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Replaces characters that cannot appear in a file name and drops any
/// directory part.
fn make_legal_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    base.chars()
        .map(|c| if invalid_chars.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}

fn display_ratio(num: i64, den: i64) -> String {
    if den == 0 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", 100.0 * num as f64 / den as f64)
    }
}

/// Per-run state of the command line tool.
struct GunzipState {
    opts: Options,
    program_name: String,
    exit_code: i32,
    total_in: u64,
    total_out: u64,
    listed: usize,
}

impl GunzipState {
    fn new(opts: Options, program_name: String) -> Self {
        GunzipState {
            opts,
            program_name,
            exit_code: OK,
            total_in: 0,
            total_out: 0,
            listed: 0,
        }
    }

    fn help(&self) {
        println!("Usage: {} [OPTION]... [FILE]...", self.program_name);
        for line in HELP_MSG {
            println!("{}", line);
        }
    }

    fn license(&self) {
        println!("{} {}", self.program_name, VERSION);
        for line in LICENSE_MSG {
            println!("{}", line);
        }
    }

    fn warn(&mut self, msg: &str) {
        if !self.opts.quiet {
            eprintln!("{}: {}", self.program_name, msg);
        }
        if self.exit_code == OK {
            self.exit_code = WARNING;
        }
    }

    fn run(&mut self) -> i32 {
        if self.opts.help {
            self.help();
            return OK;
        }
        if self.opts.license {
            self.license();
            return OK;
        }
        if self.opts.version {
            println!("{} {}", self.program_name, VERSION);
            return OK;
        }

        let files = if self.opts.files.is_empty() {
            vec!["-".to_string()]
        } else {
            self.opts.files.clone()
        };
        for name in &files {
            let result = if name == "-" { self.treat_stdin() } else { self.treat_file(name) };
            if let Err(err) = result {
                eprintln!("{}: {}: {}", self.program_name, if name == "-" { "stdin" } else { name }, err);
                self.exit_code = ERROR;
            }
        }

        if self.opts.list && !self.opts.quiet && self.listed > 1 {
            println!(
                "{:>19} {:>19} {:>5} (totals)",
                self.total_in,
                self.total_out,
                display_ratio(self.total_out as i64 - self.total_in as i64, self.total_out as i64)
            );
        }
        self.exit_code
    }

    fn treat_stdin(&mut self) -> GzipResult<()> {
        if self.opts.force == 0 && !self.opts.list && atty::is(atty::Stream::Stdin) {
            return Err(GzipError::invalid_argument(format!(
                "compressed data not read from a terminal. Use -f to force decompression.\nFor help, type: {} -h",
                self.program_name
            )));
        }

        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        let mut input = Cursor::new(data);

        if self.opts.list {
            return self.do_list(&mut input, "stdin", None);
        }

        let unzipped = unzip(&mut input, self.opts.force)?;
        self.finish_member("stdin", &unzipped);
        if !self.opts.test {
            io::stdout().lock().write_all(&unzipped.output)?;
        }
        self.report("stdin", &unzipped, None);
        Ok(())
    }

    fn treat_file(&mut self, iname: &str) -> GzipResult<()> {
        let path = Path::new(iname);
        let metadata = fs::metadata(path)?;

        if metadata.is_dir() {
            self.warn(&format!("{} is a directory -- ignored", iname));
            return Ok(());
        }
        if !self.opts.to_stdout && !metadata.is_file() {
            self.warn(&format!("{} is not a directory or a regular file -- ignored", iname));
            return Ok(());
        }

        let mut ifd = File::open(path)?;
        if self.opts.list {
            return self.do_list(&mut ifd, iname, Some(&metadata));
        }

        let writes_file = !self.opts.to_stdout && !self.opts.test;
        let default_ofname = if writes_file {
            match self.make_ofname(iname) {
                Some(name) => Some(name),
                None => {
                    self.warn(&format!("{}: unknown suffix -- ignored", iname));
                    return Ok(());
                }
            }
        } else {
            None
        };

        let unzipped = unzip(&mut ifd, self.opts.force)?;
        drop(ifd);
        self.finish_member(iname, &unzipped);

        if self.opts.test {
            self.report(iname, &unzipped, None);
            return Ok(());
        }
        if self.opts.to_stdout {
            io::stdout().lock().write_all(&unzipped.output)?;
            self.report(iname, &unzipped, None);
            return Ok(());
        }

        let ofname = match (&unzipped.header.name, default_ofname) {
            (Some(name), _) if self.opts.restore_name && !make_legal_name(name).is_empty() => {
                path.with_file_name(make_legal_name(name))
            }
            (_, Some(name)) => name,
            (_, None) => return Ok(()),
        };
        if ofname == path {
            return Err(GzipError::invalid_argument(format!(
                "restored name {} is the input file; not overwritten",
                ofname.display()
            )));
        }
        self.write_output(&ofname, &unzipped.output)?;
        self.copy_stat(&ofname, &unzipped.header, &metadata);

        if !self.opts.keep {
            fs::remove_file(path)?;
        }
        self.report(iname, &unzipped, Some(&ofname));
        Ok(())
    }

    fn finish_member(&mut self, iname: &str, unzipped: &Unzipped) {
        info!("{}: {} block(s) decoded", iname, unzipped.blocks);
        // unzip has already logged the warning itself.
        if unzipped.trailing_garbage && self.exit_code == OK {
            self.exit_code = WARNING;
        }
    }

    /// The `-v` line: name, ratio and what happened to the file.
    fn report(&self, iname: &str, unzipped: &Unzipped, ofname: Option<&Path>) {
        if self.opts.verbose == 0 {
            return;
        }
        let out = unzipped.output.len() as i64;
        let mut line = format!("{}:\t", iname);
        if self.opts.test {
            line.push_str("OK");
        } else {
            line.push_str(&display_ratio(out - unzipped.compressed_len as i64, out));
        }
        if let Some(ofname) = ofname {
            line.push_str(&format!(" -- replaced with {}", ofname.display()));
        }
        eprintln!("{}", line);
    }

    /// Output name for `iname`: the suffix stripped, `None` if it has none.
    fn make_ofname(&self, iname: &str) -> Option<PathBuf> {
        let stripped = iname.strip_suffix(self.opts.suffix.as_str())?;
        if stripped.is_empty() || stripped.ends_with('/') {
            return None;
        }
        Some(PathBuf::from(stripped))
    }

    fn write_output(&self, ofname: &Path, data: &[u8]) -> GzipResult<()> {
        let mut options = OpenOptions::new();
        options.write(true);
        if self.opts.force > 0 {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(ofname).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                GzipError::invalid_argument(format!("{} already exists; not overwritten", ofname.display()))
            } else {
                GzipError::Io(err)
            }
        })?;
        file.write_all(data)?;
        debug!("wrote {} bytes to {}", data.len(), ofname.display());
        Ok(())
    }

    /// Gives the output the header's time stamp with `-N`, else the input's.
    fn copy_stat(&mut self, ofname: &Path, header: &GzipHeader, input: &fs::Metadata) {
        let time_stamp = if self.opts.restore_time && header.mtime != 0 {
            Some(UNIX_EPOCH + Duration::from_secs(header.mtime as u64))
        } else {
            input.modified().ok()
        };
        if let Some(time_stamp) = time_stamp {
            let result = filetime::set_file_mtime(ofname, filetime::FileTime::from_system_time(time_stamp));
            if let Err(err) = result {
                self.warn(&format!("{}: {}", ofname.display(), err));
            }
        }
    }

    fn do_list<R: Read + Seek>(&mut self, input: &mut R, iname: &str, metadata: Option<&fs::Metadata>) -> GzipResult<()> {
        let compressed_size = input.seek(io::SeekFrom::End(0))?;
        input.rewind()?;
        let header = GzipHeader::read(input, self.opts.force)?;
        let uncompressed_size = original_size(input)? as u64;

        if self.listed == 0 && !self.opts.quiet {
            if self.opts.verbose > 0 {
                print!("method  date                ");
            }
            println!("{:>19} {:>19} {:>5} uncompressed_name", "compressed", "uncompressed", "ratio");
        }
        self.listed += 1;
        self.total_in += compressed_size;
        self.total_out += uncompressed_size;

        let name = match &header.name {
            Some(name) if self.opts.restore_name => make_legal_name(name),
            _ => self
                .make_ofname(iname)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| iname.to_string()),
        };

        if self.opts.verbose > 0 {
            let time_stamp = if header.mtime != 0 {
                UNIX_EPOCH + Duration::from_secs(header.mtime as u64)
            } else {
                metadata.and_then(|m| m.modified().ok()).unwrap_or_else(SystemTime::now)
            };
            let datetime: DateTime<Local> = DateTime::from(time_stamp);
            print!("defla   {} ", datetime.format("%Y-%m-%d %H:%M:%S"));
        }
        println!(
            "{:>19} {:>19} {:>5} {}",
            compressed_size,
            uncompressed_size,
            display_ratio(uncompressed_size as i64 - compressed_size as i64, uncompressed_size as i64),
            name
        );
        Ok(())
    }
}

fn main() {
    let mut args = env::args();
    let program_name = args
        .next()
        .map(|p| make_legal_name(&p))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "gunzip".to_string());

    let all_args: Vec<String> = env_args().into_iter().chain(args).collect();
    let opts = match Options::parse(all_args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{}: {}", program_name, err);
            eprintln!("Try `{} --help' for more information.", program_name);
            exit(ERROR);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opts.log_level()))
        .format_timestamp(None)
        .init();

    let mut state = GunzipState::new(opts, program_name);
    exit(state.run());
}
