// The CLI front end: loads a ROM/disk image and either free-runs for a
// cycle budget or drops into an interactive register/trace view. This is an
// embedding of the simulator-core contract, not a reimplementation of the
// excluded SDL/GUI front-end - it owns no framebuffer rendering beyond
// dumping raw pixels on request, no clickwheel input, no audio.
//
// The interactive view is a single-step, breakpoints, watches, continue,
// quit loop drawn with `termion` cursor/color primitives, named `Inspector`
// and `Trace` since it inspects an ARM core.

use clap::Parser;
use pp5021c_sim::simulator::{StepResult, StopReason};
use pp5021c_sim::{Configuration, Simulator};
use std::collections::HashSet;
use std::io::{self, Write};
use termion::{clear, color, cursor};

#[derive(Parser, Debug)]
#[command(name = "pp5021c-sim", about = "PP5021C functional simulator")]
struct Args {
    /// Path to a boot ROM image (or firmware blob to load at 0x0).
    #[arg(long)]
    rom: String,

    /// Path to a TOML configuration file; CLI flags below override it.
    #[arg(long)]
    config: Option<String>,

    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    sdram_bytes: usize,

    #[arg(long)]
    disk_image: Option<String>,

    #[arg(long)]
    projection_root: Option<String>,

    /// Free-run this many cycles instead of attaching the inspector.
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Drop into the interactive register/trace inspector.
    #[arg(long)]
    inspect: bool,
}

fn build_configuration(args: &Args) -> pp5021c_sim::SimResult<Configuration> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Configuration::from_toml(&text)?
        }
        None => Configuration::new(args.sdram_bytes),
    };
    if args.config.is_none() {
        config.sdram_bytes = args.sdram_bytes;
    }
    if let Some(disk) = &args.disk_image {
        config.disk_image_path = Some(disk.into());
    }
    if let Some(root) = &args.projection_root {
        config.projection_root = Some(root.into());
    }
    Ok(config)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match build_configuration(&args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let mut sim = match Simulator::new(&config) {
        Ok(sim) => sim,
        Err(err) => {
            log::error!("failed to construct simulator: {}", err);
            std::process::exit(1);
        }
    };

    let rom = match std::fs::read(&args.rom) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("failed to read ROM image {}: {}", args.rom, err);
            std::process::exit(1);
        }
    };
    if let Err(err) = sim.load_rom(&rom) {
        log::error!("failed to load ROM: {}", err);
        std::process::exit(1);
    }
    sim.set_pc(0);

    if args.inspect {
        let mut inspector = Inspector::new();
        inspector.run(&mut sim);
        return;
    }

    let max_cycles = args.max_cycles.unwrap_or(1_000_000);
    let result = sim.run(max_cycles);
    println!(
        "stopped after {} cycles ({} instructions): {}",
        result.cycles,
        result.instructions,
        free_run_summary(result.stop_reason)
    );
}

#[derive(PartialEq, Clone)]
enum InspectorCommand {
    Quit,
    SetBreakpoint(Option<String>),
    DeleteBreakpoint(Option<String>),
    Watch(Option<String>),
    Unwatch(Option<String>),
    Continue,
    Step,
}

/// The interactive register/trace view: draw, read one command line,
/// act, repeat.
struct Inspector {
    trace: Trace,
    running: bool,
    last_cmd: InspectorCommand,
    watches: HashSet<u32>,
}

/// A short scrollback of the last few fetched instruction addresses and
/// raw words. This simulator has no ARM/Thumb disassembler, so it shows
/// the raw fetched words rather than mnemonics.
struct Trace {
    history: Vec<(u32, u32)>,
    capacity: usize,
    breakpoints: HashSet<u32>,
}

impl Trace {
    fn new(capacity: usize) -> Self {
        Trace { history: Vec::new(), capacity, breakpoints: HashSet::new() }
    }

    fn push(&mut self, pc: u32, word: u32) {
        self.history.push((pc, word));
        if self.history.len() > self.capacity {
            self.history.remove(0);
        }
    }
}

impl Inspector {
    fn new() -> Self {
        Inspector {
            trace: Trace::new(12),
            running: false,
            last_cmd: InspectorCommand::Step,
            watches: HashSet::new(),
        }
    }

    fn run(&mut self, sim: &mut Simulator) {
        loop {
            if !self.running || self.trace.breakpoints.contains(&sim.registers().pc) {
                self.draw(sim);
                match self.get_command() {
                    InspectorCommand::Quit => return,
                    InspectorCommand::SetBreakpoint(addr) => self.set_breakpoint(addr, false),
                    InspectorCommand::DeleteBreakpoint(addr) => self.set_breakpoint(addr, true),
                    InspectorCommand::Watch(addr) => self.set_watch(addr, true),
                    InspectorCommand::Unwatch(addr) => self.set_watch(addr, false),
                    InspectorCommand::Continue => self.running = true,
                    cmd @ InspectorCommand::Step => {
                        self.last_cmd = cmd;
                        self.advance(sim);
                    }
                }
            } else {
                self.advance(sim);
            }
        }
    }

    fn advance(&mut self, sim: &mut Simulator) {
        let pc = sim.registers().pc;
        let word = sim.read_word(pc);
        self.trace.push(pc, word);
        match sim.step() {
            Ok(StepResult::Halted) => self.running = false,
            Ok(_) => {}
            Err(err) => {
                println!("simulator error: {}", err);
                self.running = false;
            }
        }
    }

    fn set_breakpoint(&mut self, addr: Option<String>, delete: bool) {
        if let Some(addr) = parse_address(&addr) {
            if delete {
                self.trace.breakpoints.remove(&addr);
            } else {
                self.trace.breakpoints.insert(addr);
            }
        }
    }

    fn set_watch(&mut self, addr: Option<String>, add: bool) {
        if let Some(addr) = parse_address(&addr) {
            if add {
                self.watches.insert(addr);
            } else {
                self.watches.remove(&addr);
            }
        }
    }

    fn get_command(&mut self) -> InspectorCommand {
        let mut input = String::new();
        io::stdin().read_line(&mut input).unwrap_or(0);
        let mut cmd = input.split_whitespace();
        match cmd.next() {
            Some("q") => InspectorCommand::Quit,
            Some("s") | Some("n") => InspectorCommand::Step,
            Some("b") => InspectorCommand::SetBreakpoint(cmd.next().map(String::from)),
            Some("d") => InspectorCommand::DeleteBreakpoint(cmd.next().map(String::from)),
            Some("w") => InspectorCommand::Watch(cmd.next().map(String::from)),
            Some("u") => InspectorCommand::Unwatch(cmd.next().map(String::from)),
            Some("c") => InspectorCommand::Continue,
            _ => self.last_cmd.clone(),
        }
    }

    fn draw(&self, sim: &mut Simulator) {
        print!("{}{}", clear::All, cursor::Goto(1, 1));
        let regs = sim.registers();
        for j in 0..4 {
            let mut line = String::new();
            for col in 0..4 {
                let r = j * 4 + col;
                line.push_str(&format!("R{r:<2}: {v:08x}  ", r = r, v = regs.get(r)));
            }
            println!("{}", line);
        }
        println!(
            "\nmode: {}  cpsr: {:08x}  cycles: {}  instructions: {}",
            regs.mode().as_asm(),
            regs.cpsr(),
            sim.get_cycles(),
            sim.get_instructions()
        );

        println!("\n{}Recent fetches{}", color::Fg(color::Blue), color::Fg(color::Reset));
        for (pc, word) in &self.trace.history {
            let marker = if self.trace.breakpoints.contains(pc) {
                format!("{}*{}", color::Fg(color::Red), color::Fg(color::Reset))
            } else {
                " ".to_string()
            };
            println!("{}{:08x}: {:08x}", marker, pc, word);
        }

        if !self.watches.is_empty() {
            println!("\nWatches");
            for addr in &self.watches {
                println!("{:08x}: {:08x}", addr, sim.read_word(*addr));
            }
        }

        print!("\nn/s step, c continue, b/d <addr> breakpoint, w/u <addr> watch, q quit\n> ");
        io::stdout().flush().ok();
    }
}

fn parse_address(addr: &Option<String>) -> Option<u32> {
    addr.as_ref().and_then(|a| u32::from_str_radix(a.trim_start_matches("0x"), 16).ok())
}

fn free_run_summary(stop: StopReason) -> &'static str {
    match stop {
        StopReason::CycleLimit => "cycle limit reached",
        StopReason::Breakpoint => "breakpoint hit",
        StopReason::Halted => "cpu halted",
        StopReason::NoCpu => "no ROM loaded",
        StopReason::ExecutionError => "execution error",
    }
}
