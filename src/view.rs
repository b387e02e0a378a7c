//! Codec for animation view resources: loops of cels with run-length-encoded
//! 4-bit pixel rows, an optional description string, and mirror-loop
//! compression (a loop stored once and row-reversed for its partner).

use log::warn;

use crate::project::ResourceProblem;
use crate::util::{push_u16_le, u16_le};

lazy_static! {
    /// The 16 view header tags the interpreter accepts: both header bytes
    /// in 1..=4.
    static ref KNOWN_SIGNATURES: Vec<u16> = {
        let mut signatures = Vec::new();
        for hi in 1..=4u16 {
            for lo in 1..=4u16 {
                signatures.push((hi << 8) | lo);
            }
        }
        signatures
    };
}

pub fn is_known_signature(signature: u16) -> bool {
    KNOWN_SIGNATURES.contains(&signature)
}

/// One animation frame. `pixel_data` is always fully materialized
/// (`width * height` bytes of 0-15 colors); mirroring is resolved at decode
/// time and re-detected at encode time, never represented here.
#[derive(Debug, Clone, PartialEq)]
pub struct Cel {
    pub width: u8,
    pub height: u8,
    pub transparency_color: u8,
    pub pixel_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewLoop {
    pub cels: Vec<Cel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewResource {
    pub signature: u16,
    pub description: Option<Vec<u8>>,
    pub loops: Vec<ViewLoop>,
    pub vol_number: u8,
}

const MIRROR_FLAG: u8 = 0x80;

fn reverse_rows(pixels: &[u8], width: usize) -> Vec<u8> {
    if width == 0 {
        return pixels.to_vec();
    }
    let mut out = Vec::with_capacity(pixels.len());
    for row in pixels.chunks(width) {
        out.extend(row.iter().rev());
    }
    out
}

fn unpack_cel(data: &[u8], cel_pos: usize, loop_number: u8) -> Result<Cel, ResourceProblem> {
    if cel_pos + 3 > data.len() {
        return Err(ResourceProblem::Truncated);
    }
    let width = data[cel_pos] as usize;
    let height = data[cel_pos + 1] as usize;
    let trans_mirror = data[cel_pos + 2];
    let transparency_color = trans_mirror & 0x0f;
    let mirrored = trans_mirror & MIRROR_FLAG != 0 && (trans_mirror >> 4) & 0x07 != loop_number;

    let mut pixels = vec![transparency_color; width * height];
    let mut pos = cel_pos + 3;
    for row in 0..height {
        let mut x = 0usize;
        loop {
            if pos >= data.len() {
                return Err(ResourceProblem::Truncated);
            }
            let token = data[pos];
            pos += 1;
            let run = (token & 0x0f) as usize;
            if run == 0 {
                break;
            }
            let color = token >> 4;
            if x + run > width {
                warn!(
                    "cel row {} overflows width {} at offset {}",
                    row, width, pos
                );
                return Err(ResourceProblem::PixelDataExceedsRow);
            }
            for pixel in &mut pixels[row * width + x..row * width + x + run] {
                *pixel = color;
            }
            x += run;
        }
    }

    if mirrored {
        pixels = reverse_rows(&pixels, width);
    }

    Ok(Cel {
        width: width as u8,
        height: height as u8,
        transparency_color,
        pixel_data: pixels,
    })
}

/// Decode a view resource from its (already decompressed) bytes.
pub fn unpack_view(data: &[u8], vol_number: u8) -> Result<ViewResource, ResourceProblem> {
    let signature = u16_le(data, 0).ok_or(ResourceProblem::Truncated)?;
    if !is_known_signature(signature) {
        warn!("unknown view signature {:#06x}", signature);
        return Err(ResourceProblem::UnknownSignature);
    }
    if data.len() < 5 {
        return Err(ResourceProblem::Truncated);
    }
    let loop_count = data[2] as usize;
    let description_pos = u16_le(data, 3).ok_or(ResourceProblem::Truncated)? as usize;

    let description = if description_pos != 0 {
        if description_pos >= data.len() {
            return Err(ResourceProblem::Truncated);
        }
        let text = match data[description_pos..].iter().position(|&b| b == 0) {
            Some(end) => data[description_pos..description_pos + end].to_vec(),
            None => data[description_pos..].to_vec(),
        };
        Some(text)
    } else {
        None
    };

    let mut loops = Vec::with_capacity(loop_count);
    for loop_number in 0..loop_count {
        let loop_pos = u16_le(data, 5 + loop_number * 2).ok_or(ResourceProblem::Truncated)? as usize;
        if loop_pos >= data.len() {
            return Err(ResourceProblem::Truncated);
        }
        let cel_count = data[loop_pos] as usize;
        let mut cels = Vec::with_capacity(cel_count);
        for cel_number in 0..cel_count {
            let rel = u16_le(data, loop_pos + 1 + cel_number * 2).ok_or(ResourceProblem::Truncated)?
                as usize;
            cels.push(unpack_cel(data, loop_pos + rel, loop_number as u8)?);
        }
        loops.push(ViewLoop { cels });
    }

    Ok(ViewResource {
        signature,
        description,
        loops,
        vol_number,
    })
}

fn encode_rows(cel: &Cel, out: &mut Vec<u8>) {
    let width = cel.width as usize;
    for row_index in 0..cel.height as usize {
        let row = &cel.pixel_data[row_index * width..row_index * width + width];
        let mut x = 0usize;
        while x < width {
            let color = row[x];
            let mut run = 1usize;
            while x + run < width && row[x + run] == color {
                run += 1;
            }
            // The trailing transparent run of each row is implied.
            if x + run == width && color == cel.transparency_color {
                break;
            }
            let mut remaining = run;
            while remaining > 15 {
                out.push((color << 4) | 15);
                remaining -= 15;
            }
            if remaining > 0 {
                out.push((color << 4) | remaining as u8);
            }
            x += run;
        }
        out.push(0);
    }
}

fn is_mirror_pair(a: &ViewLoop, b: &ViewLoop) -> bool {
    a.cels.len() == b.cels.len()
        && a.cels.iter().zip(&b.cels).all(|(ca, cb)| {
            ca.width == cb.width
                && ca.height == cb.height
                && ca.transparency_color == cb.transparency_color
                && reverse_rows(&ca.pixel_data, ca.width as usize) == cb.pixel_data
        })
}

/// Encode a view resource. Mirror pairs among the first 8 loops are found by
/// greedy first-match pairing and the lower-indexed loop of each pair is
/// stored; its partner reuses the same loop table with the mirror flag set.
pub fn pack_view(view: &ViewResource) -> Result<Vec<u8>, String> {
    let loop_count = view.loops.len();
    if loop_count > 255 {
        return Err(format!("view has {} loops, the limit is 255", loop_count));
    }

    // Greedy mirror pairing: mirror_of[j] = i means loop j reuses loop i.
    let mut mirror_of: Vec<Option<usize>> = vec![None; loop_count];
    let mut paired = vec![false; loop_count];
    for j in 1..loop_count.min(8) {
        if paired[j] {
            continue;
        }
        for i in 0..j {
            if !paired[i] && is_mirror_pair(&view.loops[i], &view.loops[j]) {
                mirror_of[j] = Some(i);
                paired[i] = true;
                paired[j] = true;
                break;
            }
        }
    }

    let mut out = vec![
        (view.signature & 0xff) as u8,
        (view.signature >> 8) as u8,
        loop_count as u8,
        0,
        0,
    ];
    out.resize(5 + loop_count * 2, 0);

    let mut loop_positions = vec![0usize; loop_count];
    for (index, view_loop) in view.loops.iter().enumerate() {
        if let Some(source) = mirror_of[index] {
            loop_positions[index] = loop_positions[source];
            continue;
        }
        let loop_pos = out.len();
        loop_positions[index] = loop_pos;
        let cel_count = view_loop.cels.len();
        if cel_count > 255 {
            return Err(format!("loop has {} cels, the limit is 255", cel_count));
        }
        out.push(cel_count as u8);
        let cel_table = out.len();
        out.resize(out.len() + cel_count * 2, 0);
        for (cel_number, cel) in view_loop.cels.iter().enumerate() {
            let rel = out.len() - loop_pos;
            out[cel_table + cel_number * 2] = (rel & 0xff) as u8;
            out[cel_table + cel_number * 2 + 1] = (rel >> 8) as u8;
            let trans_mirror = if paired[index] {
                MIRROR_FLAG | ((index as u8) << 4) | cel.transparency_color
            } else {
                cel.transparency_color
            };
            out.push(cel.width);
            out.push(cel.height);
            out.push(trans_mirror);
            encode_rows(cel, &mut out);
        }
    }

    for (index, &pos) in loop_positions.iter().enumerate() {
        if pos > 0xffff {
            return Err("view resource too large".to_string());
        }
        out[5 + index * 2] = (pos & 0xff) as u8;
        out[5 + index * 2 + 1] = (pos >> 8) as u8;
    }

    if let Some(description) = &view.description {
        let pos = out.len();
        out[3] = (pos & 0xff) as u8;
        out[4] = (pos >> 8) as u8;
        out.extend_from_slice(description);
        out.push(0);
    }
    if out.len() > 0xffff {
        return Err("view resource too large".to_string());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cel(width: u8, height: u8, transparency: u8, pixels: &[u8]) -> Cel {
        assert_eq!(pixels.len(), width as usize * height as usize);
        Cel {
            width,
            height,
            transparency_color: transparency,
            pixel_data: pixels.to_vec(),
        }
    }

    fn simple_view() -> ViewResource {
        ViewResource {
            signature: 0x0101,
            description: Some(b"An ordinary-looking door.".to_vec()),
            loops: vec![ViewLoop {
                cels: vec![
                    cel(4, 2, 0, &[1, 1, 2, 0, 0, 2, 2, 0]),
                    cel(2, 2, 7, &[7, 3, 3, 7]),
                ],
            }],
            vol_number: 1,
        }
    }

    #[test]
    fn round_trip_simple() {
        let view = simple_view();
        let packed = pack_view(&view).unwrap();
        assert_eq!(unpack_view(&packed, 1), Ok(view));
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let mut packed = pack_view(&simple_view()).unwrap();
        packed[0] = 0x99;
        assert_eq!(unpack_view(&packed, 1), Err(ResourceProblem::UnknownSignature));
    }

    #[test]
    fn mirror_pair_is_stored_once_and_rebuilt() {
        let stored = cel(3, 2, 0, &[1, 2, 3, 4, 5, 6]);
        let mirrored = cel(3, 2, 0, &[3, 2, 1, 6, 5, 4]);
        let view = ViewResource {
            signature: 0x0102,
            description: None,
            loops: vec![
                ViewLoop { cels: vec![stored.clone()] },
                ViewLoop { cels: vec![mirrored.clone()] },
            ],
            vol_number: 0,
        };
        let packed = pack_view(&view).unwrap();
        // Both loop table entries point at the same stored loop.
        assert_eq!(packed[5..7], packed[7..9]);
        let unpacked = unpack_view(&packed, 0).unwrap();
        assert_eq!(unpacked, view);

        // A view with two unrelated loops is strictly larger.
        let unrelated = ViewResource {
            loops: vec![
                ViewLoop { cels: vec![stored] },
                ViewLoop { cels: vec![cel(3, 2, 0, &[9, 9, 9, 8, 8, 8])] },
            ],
            ..view
        };
        assert!(pack_view(&unrelated).unwrap().len() > packed.len());
    }

    #[test]
    fn byte_round_trip() {
        let mirror_pair = ViewResource {
            signature: 0x0103,
            description: None,
            loops: vec![
                ViewLoop { cels: vec![cel(3, 1, 0, &[1, 2, 3])] },
                ViewLoop { cels: vec![cel(3, 1, 0, &[3, 2, 1])] },
            ],
            vol_number: 0,
        };
        for view in [simple_view(), mirror_pair] {
            let packed = pack_view(&view).unwrap();
            let reparsed = unpack_view(&packed, 1).unwrap();
            assert_eq!(pack_view(&reparsed).unwrap(), packed);
        }
    }

    #[test]
    fn zero_loops_and_empty_cels() {
        let empty = ViewResource {
            signature: 0x0201,
            description: None,
            loops: Vec::new(),
            vol_number: 0,
        };
        assert_eq!(unpack_view(&pack_view(&empty).unwrap(), 0), Ok(empty));

        let degenerate = ViewResource {
            signature: 0x0201,
            description: None,
            loops: vec![ViewLoop {
                cels: vec![cel(0, 3, 0, &[]), cel(5, 0, 2, &[])],
            }],
            vol_number: 0,
        };
        assert_eq!(unpack_view(&pack_view(&degenerate).unwrap(), 0), Ok(degenerate));
    }

    #[test]
    fn long_runs_split_into_multiple_tokens() {
        let width = 40u8;
        let pixels = vec![5u8; 40];
        let view = ViewResource {
            signature: 0x0101,
            description: None,
            loops: vec![ViewLoop { cels: vec![cel(width, 1, 0, &pixels)] }],
            vol_number: 0,
        };
        assert_eq!(unpack_view(&pack_view(&view).unwrap(), 0), Ok(view));
    }

    #[test]
    fn row_overflow_is_reported() {
        let mut packed = pack_view(&simple_view()).unwrap();
        // Corrupt the first pixel token of the first cel into a 15-run on a
        // 4-wide row.
        let loop_pos = u16_le(&packed, 5).unwrap() as usize;
        let cel_rel = u16_le(&packed, loop_pos + 1).unwrap() as usize;
        packed[loop_pos + cel_rel + 3] = 0x1f;
        assert_eq!(unpack_view(&packed, 1), Err(ResourceProblem::PixelDataExceedsRow));
    }
}
