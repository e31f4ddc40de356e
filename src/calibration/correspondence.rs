//! Display/world point correspondences and their on-disk formats.
//!
//! Two formats are understood:
//! - a pair of line-oriented text files, `x, y` display points and
//!   `x, y, z` world points, paired by line index;
//! - a tagged document of repeated `CALIB_READ` records, each holding a
//!   `MOUSE` (X, Y) display point and a `FINGER` (X, Y, Z) world point.
//!
//! A malformed line rejects the whole file.

use glam::{DVec2, DVec3};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

use crate::error::{Result, TouchError};

/// Index-aligned display and world points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    image: Vec<DVec2>,
    world: Vec<DVec3>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair two parallel sequences. Their lengths must match.
    pub fn from_parallel(image: Vec<DVec2>, world: Vec<DVec3>) -> Result<Self> {
        if image.len() != world.len() {
            return Err(TouchError::MismatchedCorrespondences {
                image: image.len(),
                world: world.len(),
            });
        }
        Ok(Self { image, world })
    }

    pub fn push(&mut self, image: DVec2, world: DVec3) {
        self.image.push(image);
        self.world.push(world);
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn clear(&mut self) {
        self.image.clear();
        self.world.clear();
    }

    pub fn image(&self) -> &[DVec2] {
        &self.image
    }

    pub fn world(&self) -> &[DVec3] {
        &self.world
    }

    pub fn pairs(&self) -> impl Iterator<Item = (DVec2, DVec3)> + '_ {
        self.image.iter().copied().zip(self.world.iter().copied())
    }

    /// Pairs whose display point is non-zero in both components.
    /// Finger-point documents leave unused records at (0, 0).
    pub fn usable_count(&self) -> usize {
        self.image.iter().filter(|p| p.x != 0.0 && p.y != 0.0).count()
    }

    /// Exchange the Y and Z components of every world point.
    pub fn swap_world_yz(&mut self) {
        for p in &mut self.world {
            *p = DVec3::new(p.x, p.z, p.y);
        }
    }
}

/// Parse display points, one `x, y` per line. Blank lines are skipped.
pub fn parse_image_points(contents: &str, source: &str) -> Result<Vec<DVec2>> {
    let mut points = Vec::new();
    for (line_no, fields) in numeric_lines(contents, source, 2) {
        let fields = fields?;
        log::debug!("image point {}: {:?}", line_no, fields);
        points.push(DVec2::new(fields[0], fields[1]));
    }
    Ok(points)
}

/// Parse world points, one `x, y, z` per line. Blank lines are skipped.
pub fn parse_world_points(contents: &str, source: &str) -> Result<Vec<DVec3>> {
    let mut points = Vec::new();
    for (line_no, fields) in numeric_lines(contents, source, 3) {
        let fields = fields?;
        log::debug!("world point {}: {:?}", line_no, fields);
        points.push(DVec3::new(fields[0], fields[1], fields[2]));
    }
    Ok(points)
}

fn numeric_lines<'a>(
    contents: &'a str,
    source: &'a str,
    arity: usize,
) -> impl Iterator<Item = (usize, Result<Vec<f64>>)> + 'a {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(move |(idx, line)| {
            let line_no = idx + 1;
            let malformed = |reason: String| TouchError::MalformedCorrespondenceFile {
                path: source.to_string(),
                line: line_no,
                reason,
            };

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != arity {
                return (
                    line_no,
                    Err(malformed(format!("expected {} fields, found {}", arity, fields.len()))),
                );
            }

            let parsed = fields
                .iter()
                .map(|f| {
                    f.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| malformed(format!("invalid number {:?}", f)))
                })
                .collect::<Result<Vec<f64>>>();
            (line_no, parsed)
        })
}

/// Load a display/world file pair into an index-aligned set.
pub fn load_correspondence_files(image_path: &Path, world_path: &Path) -> Result<CorrespondenceSet> {
    let image_contents = std::fs::read_to_string(image_path)?;
    let world_contents = std::fs::read_to_string(world_path)?;

    let image = parse_image_points(&image_contents, &image_path.display().to_string())?;
    let world = parse_world_points(&world_contents, &world_path.display().to_string())?;

    let set = CorrespondenceSet::from_parallel(image, world)?;
    log::info!(
        "Loaded {} correspondences from {} / {}",
        set.len(),
        image_path.display(),
        world_path.display()
    );
    Ok(set)
}

/// Render the display file contents for a set.
pub fn format_image_points(set: &CorrespondenceSet) -> String {
    set.image().iter().map(|p| format!("{}, {}\n", p.x, p.y)).collect()
}

/// Render the world file contents for a set.
pub fn format_world_points(set: &CorrespondenceSet) -> String {
    set.world()
        .iter()
        .map(|p| format!("{}, {}, {}\n", p.x, p.y, p.z))
        .collect()
}

/// Write a set as a display/world file pair.
pub fn save_correspondence_files(set: &CorrespondenceSet, image_path: &Path, world_path: &Path) -> Result<()> {
    std::fs::write(image_path, format_image_points(set))?;
    std::fs::write(world_path, format_world_points(set))?;
    log::info!(
        "Saved {} correspondences to {} / {}",
        set.len(),
        image_path.display(),
        world_path.display()
    );
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
struct CalibRead {
    mouse: DVec2,
    finger: DVec3,
}

/// Parse a finger-point document. Records keep document order; missing
/// values read as zero. With `swap_yz` the world Y and Z are exchanged.
pub fn parse_finger_points(contents: &str, source: &str, swap_yz: bool) -> Result<CorrespondenceSet> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut current: Option<CalibRead> = None;
    let mut set = CorrespondenceSet::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "CALIB_READ" {
                    current = Some(CalibRead::default());
                }
                path.push(name);
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("CALIB_READ") {
                    if let Some(read) = current.take() {
                        set.push(read.mouse, read.finger);
                    }
                }
            }
            Event::Text(text) => {
                let Some(read) = current.as_mut() else { continue };
                let n = path.len();
                if n < 2 {
                    continue;
                }
                let field = match (path[n - 2].as_str(), path[n - 1].as_str()) {
                    ("MOUSE", "X") => &mut read.mouse.x,
                    ("MOUSE", "Y") => &mut read.mouse.y,
                    ("FINGER", "X") => &mut read.finger.x,
                    ("FINGER", "Y") => &mut read.finger.y,
                    ("FINGER", "Z") => &mut read.finger.z,
                    _ => continue,
                };
                let raw = String::from_utf8_lossy(&text);
                *field = raw.trim().parse().map_err(|_| TouchError::MalformedCorrespondenceFile {
                    path: source.to_string(),
                    line: set.len() + 1,
                    reason: format!("invalid number {:?} in {}:{}", raw, path[n - 2], path[n - 1]),
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if swap_yz {
        set.swap_world_yz();
    }
    log::info!(
        "Read {} CALIB_READ records from {} ({} usable)",
        set.len(),
        source,
        set.usable_count()
    );
    Ok(set)
}

/// Load a finger-point document from disk.
pub fn load_finger_points(path: &Path, swap_yz: bool) -> Result<CorrespondenceSet> {
    let contents = std::fs::read_to_string(path)?;
    parse_finger_points(&contents, &path.display().to_string(), swap_yz)
}
