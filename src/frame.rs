//! Frames: the snapshots a simulation hands to `RunController::log`.
//!
//! The upload payload is PDB text. Anything implementing [`Frame`] can be
//! logged; [`Structure`] covers parsed coordinates and [`PdbText`] passes
//! pre-rendered files straight through.

use crate::error::FrameError;
use crate::model::Annotations;
use std::fmt::Write as _;

/// eV to Kelvin (1 / k_B).
pub const EV_TO_K: f64 = 11604.518;

pub trait Frame {
    /// Potential energy in eV, or `None` when no calculator is attached.
    fn potential_energy(&self) -> Option<f64>;

    /// Render the frame as PDB text into `out`.
    fn write_pdb(&self, out: &mut String) -> Result<(), FrameError>;

    fn to_pdb(&self) -> Result<String, FrameError> {
        let mut out = String::new();
        self.write_pdb(&mut out)?;
        Ok(out)
    }
}

/// Engine state read alongside a frame for the time/temperature annotations.
pub trait SimulationContext {
    /// Elapsed simulation time in picoseconds.
    fn time_ps(&self) -> f64;
    /// Instantaneous temperature as k_B·T in eV.
    fn temperature_ev(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub record: Record,
    pub serial: u32,
    pub name: String,
    pub residue: String,
    pub chain: char,
    pub residue_seq: i32,
    /// Cartesian position in Ångström.
    pub position: [f64; 3],
    pub element: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Atom,
    Hetatm,
}

impl Record {
    fn as_str(self) -> &'static str {
        match self {
            Record::Atom => "ATOM",
            Record::Hetatm => "HETATM",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    pub atoms: Vec<Atom>,
    /// Set by whatever calculator produced the frame, in eV.
    pub energy: Option<f64>,
}

impl Structure {
    /// Parse the `ATOM`/`HETATM` records of a PDB file. Other records are
    /// ignored; only the first model is read.
    pub fn from_pdb(text: &str) -> Result<Self, FrameError> {
        let mut atoms = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let record = if line.starts_with("ATOM") {
                Record::Atom
            } else if line.starts_with("HETATM") {
                Record::Hetatm
            } else if line.starts_with("ENDMDL") && !atoms.is_empty() {
                break;
            } else {
                continue;
            };
            atoms.push(parse_atom(record, line, idx + 1)?);
        }
        if atoms.is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(Self { atoms, energy: None })
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Replace every atom position, keeping topology.
    pub fn set_positions(&mut self, positions: &[[f64; 3]]) -> Result<(), FrameError> {
        if positions.len() != self.atoms.len() {
            return Err(FrameError::AtomCount {
                expected: self.atoms.len(),
                actual: positions.len(),
            });
        }
        for (atom, pos) in self.atoms.iter_mut().zip(positions) {
            atom.position = *pos;
        }
        Ok(())
    }
}

impl Frame for Structure {
    fn potential_energy(&self) -> Option<f64> {
        self.energy
    }

    fn write_pdb(&self, out: &mut String) -> Result<(), FrameError> {
        for atom in &self.atoms {
            // Names shorter than four characters start in column 14.
            let name = if atom.name.len() < 4 {
                format!(" {:<3}", atom.name)
            } else {
                atom.name.clone()
            };
            let _ = writeln!(
                out,
                "{:<6}{:>5} {:<4} {:>3} {}{:>4}    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
                atom.record.as_str(),
                atom.serial % 100_000,
                name,
                atom.residue,
                atom.chain,
                atom.residue_seq,
                atom.position[0],
                atom.position[1],
                atom.position[2],
                1.0,
                0.0,
                atom.element,
            );
        }
        out.push_str("END\n");
        Ok(())
    }
}

/// Already-rendered PDB text, uploaded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PdbText(pub String);

impl Frame for PdbText {
    fn potential_energy(&self) -> Option<f64> {
        None
    }

    fn write_pdb(&self, out: &mut String) -> Result<(), FrameError> {
        out.push_str(&self.0);
        Ok(())
    }
}

/// Many frames rendered into a single PDB for a one-shot upload. Each frame
/// is preceded by its header as `key=value` lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    text: String,
    frames: usize,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F: Frame + ?Sized>(
        &mut self,
        frame: &F,
        header: &Annotations,
    ) -> Result<(), FrameError> {
        let mut block = String::new();
        for (key, value) in header {
            let _ = writeln!(block, "{key}={value}");
        }
        frame.write_pdb(&mut block)?;
        if !block.ends_with('\n') {
            block.push('\n');
        }
        self.text.push_str(&block);
        self.frames += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn as_pdb(&self) -> &str {
        &self.text
    }
}

/// Split a multi-model PDB into one text per `MODEL` block. A file without
/// `MODEL` records yields itself.
pub fn split_models(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split("\nMODEL").collect();
    if parts.len() <= 2 && !text.starts_with("MODEL") {
        return vec![text.to_string()];
    }
    // The first piece is whatever header precedes the first MODEL.
    let mut models: Vec<String> = parts[1..]
        .iter()
        .map(|body| format!("MODEL{body}"))
        .collect();
    if let Some(first) = parts.first().filter(|p| p.starts_with("MODEL")) {
        models.insert(0, (*first).to_string());
    }
    models
}

/// Fixed-width PDB column, trimmed. Short lines read as blank.
fn column(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_atom(record: Record, line: &str, line_no: usize) -> Result<Atom, FrameError> {
    let col = |start: usize, end: usize| column(line, start, end);
    let coord = |start: usize, axis: &str| -> Result<f64, FrameError> {
        column(line, start, start + 8)
            .parse::<f64>()
            .map_err(|_| FrameError::Parse {
                line: line_no,
                reason: format!("bad {axis} coordinate"),
            })
    };
    let position = [coord(30, "x")?, coord(38, "y")?, coord(46, "z")?];
    let name = col(12, 16).to_string();
    let element = match col(76, 78) {
        "" => name
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(String::from)
            .unwrap_or_default(),
        e => e.to_string(),
    };
    Ok(Atom {
        record,
        serial: col(6, 11).parse().unwrap_or(0),
        name,
        residue: col(17, 20).to_string(),
        chain: line.chars().nth(21).filter(|c| !c.is_whitespace()).unwrap_or('A'),
        residue_seq: col(22, 26).parse().unwrap_or(0),
        position,
        element,
    })
}
