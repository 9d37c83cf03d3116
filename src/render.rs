use crate::branch::Branch;

const OPEN: char = '#';
const BLOCKED: char = '_';
/// Printed for pieces whose side has no single-character digit.
const WIDE: char = '*';

/// ASCII map of a branch, one line per row: each covered tile shows the side
/// of its piece (base 36), open tiles `#`, blocked tiles `_`.
pub fn render_branch(branch: &Branch) -> String {
    let grid = branch.grid();
    let (width, height) = (grid.width(), grid.height());
    let mut cells = vec![vec![BLOCKED; width]; height];

    for x in 0..width {
        for y in 0..height {
            if grid.is_open(x as i32, y as i32) {
                cells[y][x] = OPEN;
            }
        }
    }

    for p in branch.pieces() {
        let label = std::char::from_digit(p.side(), 36).unwrap_or(WIDE);
        let rect = p.footprint();
        for x in rect.x1..rect.x2 {
            for y in rect.y1..rect.y2 {
                cells[y as usize][x as usize] = label;
            }
        }
    }

    let mut result = String::with_capacity((width + 1) * height);
    for row in &cells {
        result.extend(row.iter());
        result.push('\n');
    }
    result
}
