//! The one model this site makes: an axis-aligned cube as ASCII STL.

use chrono::{DateTime, FixedOffset};
use rand::Rng;
use std::fmt::Write;

pub const MIN_EDGE_MM: f64 = 10.0;
pub const MAX_EDGE_MM: f64 = 60.0;

/// Corner indices of each face's two triangles, counter-clockwise when
/// seen from outside, paired with the outward normal.
const FACES: [([i8; 3], [[usize; 3]; 2]); 6] = [
  ([0, 0, -1], [[0, 2, 1], [0, 3, 2]]),
  ([0, 0, 1], [[4, 5, 6], [4, 6, 7]]),
  ([-1, 0, 0], [[0, 4, 7], [0, 7, 3]]),
  ([1, 0, 0], [[1, 2, 6], [1, 6, 5]]),
  ([0, -1, 0], [[0, 1, 5], [0, 5, 4]]),
  ([0, 1, 0], [[3, 7, 6], [3, 6, 2]]),
];

/// Cube corners on the unit lattice: bottom face 0..4, top face 4..8.
const CORNERS: [[u8; 3]; 8] = [
  [0, 0, 0],
  [1, 0, 0],
  [1, 1, 0],
  [0, 1, 0],
  [0, 0, 1],
  [1, 0, 1],
  [1, 1, 1],
  [0, 1, 1],
];

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
  pub file_name: String,
  pub edge_mm: f64,
  pub contents: String,
}

/// Generate a cube with a random edge length, named after `now`.
pub fn generate<R: Rng>(rng: &mut R, now: DateTime<FixedOffset>) -> Model {
  let edge_mm = rng.gen_range(MIN_EDGE_MM..=MAX_EDGE_MM);
  let edge_mm = (edge_mm * 10.0).round() / 10.0;
  Model {
    file_name: file_name(now),
    edge_mm,
    contents: cube(edge_mm),
  }
}

pub fn file_name(now: DateTime<FixedOffset>) -> String {
  format!("3dflick_{}.stl", now.format("%Y-%m-%d_%H%M%S"))
}

/// ASCII STL for a cube with one corner at the origin.
pub fn cube(edge: f64) -> String {
  let mut out = String::from("solid cube\n");
  for (normal, triangles) in FACES {
    for triangle in triangles {
      // Writing into a String cannot fail
      let _ = writeln!(
        out,
        "  facet normal {} {} {}",
        normal[0], normal[1], normal[2]
      );
      out.push_str("    outer loop\n");
      for corner in triangle {
        let [x, y, z] = CORNERS[corner].map(|c| f64::from(c) * edge);
        let _ = writeln!(out, "      vertex {} {} {}", x, y, z);
      }
      out.push_str("    endloop\n");
      out.push_str("  endfacet\n");
    }
  }
  out.push_str("endsolid cube\n");
  out
}
