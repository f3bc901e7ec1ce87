mod logging;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use nufs::{BlockDevice, FileSystem, FsError, InodeMode, BLOCK_COUNT, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const DEFAULT_IMAGE: &str = "nufs.img";

/// A disk image file seen as `BLOCK_COUNT` blocks.
struct BlockFile(Mutex<File>);

impl BlockFile {
    /// Open `path`, creating it and growing it to full size when needed.
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let image_size = (BLOCK_COUNT * BLOCK_SIZE) as u64;
        if file.metadata()?.len() < image_size {
            file.set_len(image_size)?;
        }
        Ok(Self(Mutex::new(file)))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().expect("image file lock poisoned");
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("Error occurred when seeking");
        file.read_exact(buf).expect("Not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().expect("image file lock poisoned");
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("Error when seeking!");
        file.write_all(buf).expect("Not a complete block!");
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Fs(#[from] FsError),
    #[error("invalid {what}: {value}")]
    BadArgument { what: &'static str, value: String },
}

fn app() -> App<'static, 'static> {
    let path = || Arg::with_name("PATH").required(true).help("File path, e.g. /a.txt");
    let offset = || {
        Arg::with_name("offset")
            .long("offset")
            .takes_value(true)
            .default_value("0")
            .help("Byte offset into the file")
    };
    App::new("nufs")
        .about("Inspect and edit a flat nufs disk image")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .default_value(DEFAULT_IMAGE)
                .help("Disk image file, created when missing"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .help("Log level (off, error, warn, info, debug, trace); NUFS_LOG also works"),
        )
        .subcommand(SubCommand::with_name("format").about("Wipe the image and create an empty root"))
        .subcommand(SubCommand::with_name("ls").about("List the root directory"))
        .subcommand(
            SubCommand::with_name("stat")
                .about("Show mode and size")
                .arg(path()),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Print file contents")
                .arg(path())
                .arg(offset())
                .arg(
                    Arg::with_name("len")
                        .long("len")
                        .takes_value(true)
                        .help("Bytes to read, up to the end of the file by default"),
                ),
        )
        .subcommand(
            SubCommand::with_name("touch")
                .about("Create an empty file")
                .arg(path())
                .arg(
                    Arg::with_name("mode")
                        .long("mode")
                        .takes_value(true)
                        .default_value("644")
                        .help("Octal permission bits"),
                ),
        )
        .subcommand(
            SubCommand::with_name("mkdir")
                .about("Create a directory-mode entry (the namespace stays flat)")
                .arg(path())
                .arg(
                    Arg::with_name("mode")
                        .long("mode")
                        .takes_value(true)
                        .default_value("755")
                        .help("Octal permission bits"),
                ),
        )
        .subcommand(
            SubCommand::with_name("write")
                .about("Write text into an existing file")
                .arg(path())
                .arg(Arg::with_name("TEXT").required(true))
                .arg(offset()),
        )
        .subcommand(
            SubCommand::with_name("import")
                .about("Copy a host file into the image")
                .arg(Arg::with_name("HOST_FILE").required(true))
                .arg(path()),
        )
        .subcommand(
            SubCommand::with_name("truncate")
                .about("Set the file size")
                .arg(path())
                .arg(Arg::with_name("SIZE").required(true)),
        )
        .subcommand(
            SubCommand::with_name("mv")
                .about("Rename a file")
                .arg(Arg::with_name("FROM").required(true))
                .arg(Arg::with_name("TO").required(true)),
        )
}

fn arg<'a>(matches: &'a ArgMatches, name: &'static str) -> Result<&'a str, CliError> {
    matches.value_of(name).ok_or(CliError::BadArgument {
        what: name,
        value: String::new(),
    })
}

fn number(matches: &ArgMatches, name: &'static str, radix: u32) -> Result<usize, CliError> {
    let value = arg(matches, name)?;
    usize::from_str_radix(value, radix).map_err(|_| CliError::BadArgument {
        what: name,
        value: value.to_string(),
    })
}

fn execute(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), CliError> {
    let image = arg(matches, "image")?;
    let device = Arc::new(BlockFile::open(Path::new(image))?);
    let (command, sub) = matches.subcommand();
    let mut fs = if command == "format" {
        FileSystem::format(device)?
    } else {
        FileSystem::open(device)?
    };
    log::info!("[{}] image {}", command, image);
    let sub = match sub {
        Some(sub) => sub,
        None => return Ok(()),
    };
    match command {
        "format" => writeln!(
            out,
            "formatted {}: {} blocks of {} bytes, {} in use",
            image,
            BLOCK_COUNT,
            BLOCK_SIZE,
            fs.used_blocks()?
        )?,
        "ls" => {
            for (name, stat) in fs.list_stat()? {
                writeln!(out, "{:06o} {:>5} {}", stat.mode.bits(), stat.size, name)?;
            }
        }
        "stat" => {
            let stat = fs.stat(arg(sub, "PATH")?)?;
            writeln!(
                out,
                "inode {} mode {:06o} size {}",
                stat.inum,
                stat.mode.bits(),
                stat.size
            )?;
        }
        "cat" => {
            let len = match sub.value_of("len") {
                Some(_) => number(sub, "len", 10)?,
                None => BLOCK_SIZE,
            };
            let mut buffer = vec![0u8; len];
            let read = fs.read(arg(sub, "PATH")?, &mut buffer, number(sub, "offset", 10)?)?;
            out.write_all(&buffer[..read])?;
        }
        "touch" | "mkdir" => {
            let permissions = number(sub, "mode", 8)? as u32 & 0o7777;
            let kind = if command == "mkdir" {
                InodeMode::DIR
            } else {
                InodeMode::FILE
            };
            let inum = fs.create(
                arg(sub, "PATH")?,
                kind | InodeMode::from_bits_retain(permissions),
            )?;
            writeln!(out, "inode {}", inum)?;
        }
        "write" => {
            let path = arg(sub, "PATH")?;
            if !fs.exists(path) {
                return Err(FsError::NotFound.into());
            }
            let written = fs.write(path, arg(sub, "TEXT")?.as_bytes(), number(sub, "offset", 10)?)?;
            writeln!(out, "{} bytes written", written)?;
        }
        "import" => {
            let data = std::fs::read(arg(sub, "HOST_FILE")?)?;
            let path = arg(sub, "PATH")?;
            if data.len() > BLOCK_SIZE {
                return Err(FsError::FileTooLarge {
                    offset: 0,
                    len: data.len(),
                    limit: BLOCK_SIZE,
                }
                .into());
            }
            if !fs.exists(path) {
                fs.create(path, InodeMode::REGULAR_FILE)?;
            }
            let written = fs.write(path, &data, 0)?;
            fs.truncate(path, data.len())?;
            writeln!(out, "{} bytes imported", written)?;
        }
        "truncate" => fs.truncate(arg(sub, "PATH")?, number(sub, "SIZE", 10)?)?,
        "mv" => fs.rename(arg(sub, "FROM")?, arg(sub, "TO")?)?,
        _ => {}
    }
    Ok(())
}

pub fn main() {
    let matches = app().get_matches();
    let env_level = std::env::var("NUFS_LOG").ok();
    logging::init(logging::parse_level(
        matches.value_of("log").or(env_level.as_deref()),
    ));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = execute(&matches, &mut out) {
        eprintln!("nufs: {}", err);
        std::process::exit(1);
    }
}
