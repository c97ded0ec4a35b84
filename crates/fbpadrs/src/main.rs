//! Wires C1-C8 together: opens the framebuffer, loads fonts and
//! config, builds the multiplexer, puts stdin in raw non-blocking
//! mode, and runs the poll loop until quit (spec.md §6 "Keyboard
//! input", `original_source/fbpad.c`'s `main()`/`mainloop()`).

use anyhow::{Context, Result};
use clap::Parser;
use fbconf::{Config, TomlConfig};
use fbmux::Multiplexer;
use fbpad::Pad;
use fbsurface::FbSurface;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};
use std::cell::RefCell;
use std::os::fd::{BorrowedFd, RawFd};
use std::rc::Rc;

const STDIN_FD: RawFd = 0;
const HIDE_CURSOR_SEQUENCE: &str = "\x1b[2J\x1b[H\x1b[?25l";
const SHOW_CURSOR_SEQUENCE: &str = "\x1b[?25h";

#[derive(Parser, Debug)]
#[command(name = "fbpadrs", version, about = "Framebuffer-native terminal multiplexer")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "/etc/fbpad.toml")]
    config: String,

    /// Framebuffer device spec (`path` or `path:WxH+X+Y`); overrides
    /// the compiled-in default the original read from `FBDEV`.
    #[arg(short = 'd', long, default_value = "/dev/fb0")]
    device: String,

    /// Command (and arguments) to run immediately in tag 0, after which
    /// the program exits when it does (spec.md's `cmdmode`).
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config_path = args.config.clone();
    let config = TomlConfig::load(&config_path).with_context(|| format!("loading config from {config_path}"))?;

    let surface = Rc::new(RefCell::new(
        FbSurface::initialize(&args.device).with_context(|| format!("opening framebuffer device {}", args.device))?,
    ));
    surface.borrow_mut().enter().context("initializing framebuffer mode")?;

    let mut pad = {
        let palette16 = *config.palette16();
        Pad::init(surface.clone(), config.font_regular(), config.font_italic(), config.font_bold(), palette16).context("loading fonts")?
    };
    if let Some(alt_regular) = config.alt_font_regular() {
        pad.load_alternate(alt_regular, config.alt_font_italic(), config.alt_font_bold())
            .context("loading alternate font set")?;
    }
    let pad = Rc::new(RefCell::new(pad));

    run(args, Box::new(config), surface, pad, config_path)
}

fn run(args: Args, config: Box<dyn Config>, surface: Rc<RefCell<FbSurface>>, pad: Rc<RefCell<Pad>>, config_path: String) -> Result<()> {
    let device = args.device.clone();
    let mut mux = Multiplexer::new(config, surface, pad, device);
    mux.set_reload_hook(Box::new(move || TomlConfig::load(&config_path).map(|c| Box::new(c) as Box<dyn Config>)));

    fbmux::signals::install().context("installing signal handlers")?;
    fbmux::signals::setup_vt_switching(STDIN_FD);

    // SAFETY: stdin stays open for the process lifetime.
    let stdin = unsafe { BorrowedFd::borrow_raw(STDIN_FD) };
    let original_termios = tcgetattr(stdin).context("reading terminal attributes")?;
    let mut raw = original_termios.clone();
    cfmakeraw(&mut raw);
    tcsetattr(stdin, SetArg::TCSAFLUSH, &raw).context("entering raw mode")?;
    set_nonblocking(STDIN_FD);

    print_and_flush(HIDE_CURSOR_SEQUENCE);

    let startup_argv = (!args.command.is_empty()).then_some(args.command.clone());
    mux.startup(startup_argv);

    while !mux.should_exit() {
        match mux.poll_once(STDIN_FD) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) if is_eintr(&e) => {}
            Err(e) => {
                tracing::error!(%e, "poll failed");
                break;
            }
        }
        mux.service_signals(STDIN_FD);
    }

    let _ = tcsetattr(stdin, SetArg::TCSANOW, &original_termios);
    print_and_flush(SHOW_CURSOR_SEQUENCE);
    Ok(())
}

fn is_eintr(e: &fbmux::MuxError) -> bool {
    matches!(e, fbmux::MuxError::Poll(nix::Error::EINTR))
}

fn set_nonblocking(fd: RawFd) {
    let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL).unwrap_or(0);
    let flags = nix::fcntl::OFlag::from_bits_truncate(flags) | nix::fcntl::OFlag::O_NONBLOCK;
    let _ = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags));
}

fn print_and_flush(s: &str) {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(s.as_bytes());
    let _ = stdout.flush();
}
