use std::process::exit;

use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use svc::address::{Layout, MachineConfig, Word};
use svc::video::{render_text, VideoDevice};
use svc::{assemble_source, decode_program, encode_program, Cpu, Result};

/// Prints the text buffer, skipping rows that are entirely blank.
struct TerminalVideo;

impl VideoDevice for TerminalVideo {
  fn redraw(&mut self, text: &[Word], layout: &Layout) {
    let screen = render_text(text, layout);
    for row in screen.lines().filter(|row| !row.trim().is_empty()) {
      println!("│ {}", row.trim_end());
    }
  }
}

/// Writes a zero-terminated string to the top left of the screen, then adds up the numbers
/// 1 through 10 by counting down.
const DEMO: &str = r#"
greeting = "Hello from svc"

print:                        ; aa points at a string
  cpl bb 0                    ; screen position
  cpl dd 0
  cpl cc &loop
  cpl ex &done
&loop
  ldr ac aa
  cmp ac dd
  gte ex
  str bb ac
  inc aa
  inc bb
  gto cc
&done
  vga
  ret

main:
  cpl aa [greeting]
  cal {print}
  cpl ac 0
  cpl bb 10
  cpl dd 0
  cpl cc &sum
  cpl aa &end
&sum
  cmp bb dd
  gte aa
  add bb
  dec bb
  gto cc
&end
  ret
"#;

fn run(source: &str, arguments: &[&str]) -> Result<()> {
  let config = MachineConfig::default();
  let layout = Layout::new(config)?;

  let program = assemble_source(source, layout.program_offset)?;
  println!("# Program\n{}\n", program);

  let bytes = encode_program(&program)?;
  info!("encoded {} bytes of SVB", bytes.len());
  let program = decode_program(&bytes)?;

  let mut cpu = Cpu::with_video(config, Box::new(TerminalVideo))?;
  cpu.load(&program)?;
  cpu.load_arguments(arguments)?;

  let session = cpu.run()?;
  info!("halted after {} cycles", session.cycles);
  println!("{}", cpu);
  Ok(())
}

fn main() {
  if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
    eprintln!("Could not start logging: {}", e);
  }

  #[cfg(feature = "trace_computation")]
  info!("Computation Tracing ENABLED");

  // `svc [source.sva [arguments...]]`
  let args: Vec<String> = std::env::args().skip(1).collect();
  let source = match args.first() {
    Some(path) => match std::fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) => {
        error!("cannot read {}: {}", path, e);
        exit(1);
      }
    },
    None => DEMO.to_string(),
  };
  let arguments: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();

  if let Err(e) = run(&source, &arguments) {
    error!("{}", e);
    exit(1);
  }
}
