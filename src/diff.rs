//! Byte-granular shortest-edit-script diffing (Myers O(ND)), independent of
//! any resource semantics. A post-pass merges adjacent insert/delete runs
//! into length-matched `Replace` ops so the patch layer can store them as
//! XOR deltas.

/// One edit operation. `Replace` only appears after the merge post-pass;
/// its payload is the *new* bytes (the patch layer XORs them against the
/// replaced source region).
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOp {
    Same { count: usize },
    Delete { count: usize },
    Insert { bytes: Vec<u8> },
    Replace { bytes: Vec<u8> },
}

#[derive(Clone, Copy, PartialEq)]
enum MicroOp {
    Same,
    Insert,
    Delete,
}

/// Compute a minimal edit script turning `a` into `b`.
pub fn diff_bytes(a: &[u8], b: &[u8]) -> Vec<DiffOp> {
    let n = a.len();
    let m = b.len();
    let max_d = n + m;
    if max_d == 0 {
        return Vec::new();
    }

    // V is indexed by diagonal k = x - y, offset so k = 0 lands in the
    // middle. A snapshot per edit distance D is kept for backtracking.
    let v_len = 2 * max_d + 1;
    let v_offset = max_d as isize;
    let mut v = vec![0u32; v_len];
    let mut trace: Vec<Vec<u32>> = Vec::new();

    'outer: loop {
        let d = trace.len() as isize;
        assert!(d as usize <= max_d, "diff failed to converge");
        trace.push(v.clone());

        let mut k = -d;
        while k <= d {
            let from_down = k == -d
                || (k != d && v[(v_offset + k - 1) as usize] < v[(v_offset + k + 1) as usize]);
            let mut x = if from_down {
                // Insertion: inherit x from the diagonal above.
                v[(v_offset + k + 1) as usize] as usize
            } else {
                // Deletion: advance x from the diagonal below.
                v[(v_offset + k - 1) as usize] as usize + 1
            };
            let mut y = (x as isize - k) as usize;

            // Follow the snake while the bytes match.
            while x < n && y < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }

            v[(v_offset + k) as usize] = x as u32;

            if x >= n && y >= m {
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack from (n, m), collecting micro ops in reverse order.
    let mut micro: Vec<(MicroOp, usize)> = Vec::new();
    let mut x = n;
    let mut y = m;
    for d in (0..trace.len()).rev() {
        let v = &trace[d];
        let d = d as isize;
        let k = x as isize - y as isize;

        let prev_k = if k == -d
            || (k != d && v[(v_offset + k - 1) as usize] < v[(v_offset + k + 1) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(v_offset + prev_k) as usize] as usize;
        let prev_y = (prev_x as isize - prev_k) as usize;

        while x > prev_x && y > prev_y {
            micro.push((MicroOp::Same, x - 1));
            x -= 1;
            y -= 1;
        }
        if d == 0 {
            break;
        }
        if x == prev_x {
            micro.push((MicroOp::Insert, prev_y));
        } else {
            micro.push((MicroOp::Delete, prev_x));
        }
        x = prev_x;
        y = prev_y;
    }
    micro.reverse();

    // Merge runs of equal micro ops into DiffOps.
    let mut edits: Vec<DiffOp> = Vec::new();
    let mut i = 0;
    while i < micro.len() {
        let (kind, pos) = micro[i];
        let mut run = 1;
        while i + run < micro.len() && micro[i + run].0 == kind {
            run += 1;
        }
        match kind {
            MicroOp::Same => edits.push(DiffOp::Same { count: run }),
            MicroOp::Delete => edits.push(DiffOp::Delete { count: run }),
            MicroOp::Insert => edits.push(DiffOp::Insert {
                bytes: b[pos..pos + run].to_vec(),
            }),
        }
        i += run;
    }

    merge_replacements(&mut edits);
    edits
}

/// Collapse adjacent insert/delete clusters into a `Replace` of the shared
/// length, keeping any remainder as a smaller insert or delete. The
/// reconstructed output is unchanged.
fn merge_replacements(edits: &mut Vec<DiffOp>) {
    let mut i = 0;
    while i + 1 < edits.len() {
        let (mut insert_count, mut delete_count) = match &edits[i] {
            DiffOp::Delete { count } => (0usize, *count),
            DiffOp::Insert { bytes } => (bytes.len(), 0usize),
            _ => {
                i += 1;
                continue;
            }
        };
        let mut j = i + 1;
        while j < edits.len() {
            match &edits[j] {
                DiffOp::Insert { bytes } => insert_count += bytes.len(),
                DiffOp::Delete { count } => delete_count += *count,
                _ => break,
            }
            j += 1;
        }
        let replace_count = insert_count.min(delete_count);
        if replace_count > 0 {
            let mut concat = Vec::with_capacity(insert_count);
            for edit in &edits[i..j] {
                if let DiffOp::Insert { bytes } = edit {
                    concat.extend_from_slice(bytes);
                }
            }
            let mut replacement = vec![DiffOp::Replace {
                bytes: concat[..replace_count].to_vec(),
            }];
            if insert_count > replace_count {
                replacement.push(DiffOp::Insert {
                    bytes: concat[replace_count..].to_vec(),
                });
            }
            if delete_count > replace_count {
                replacement.push(DiffOp::Delete {
                    count: delete_count - replace_count,
                });
            }
            let step = replacement.len();
            edits.splice(i..j, replacement);
            i += step;
        } else {
            i += 1;
        }
    }
}

/// Apply an edit script to `input`, producing the target bytes.
pub fn apply_diff(input: &[u8], ops: &[DiffOp]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    for op in ops {
        match op {
            DiffOp::Delete { count } => pos += count,
            DiffOp::Insert { bytes } => out.extend_from_slice(bytes),
            DiffOp::Same { count } => {
                out.extend_from_slice(&input[pos..pos + count]);
                pos += count;
            }
            DiffOp::Replace { bytes } => {
                out.extend_from_slice(bytes);
                pos += bytes.len();
            }
        }
    }
    out
}
