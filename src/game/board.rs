use std::fmt;

/// Side length of the board.
pub const SIZE: usize = 3;

/// Contents of one cell.
///
/// The discriminants are the numeric encoding used by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum Tile {
    #[default]
    Empty = -1,
    Player1 = 0,
    Player2 = 1,
}

impl Tile {
    pub fn value(self) -> i8 {
        self as i8
    }

    /// Character drawn for this tile.
    pub fn symbol(self) -> char {
        match self {
            Tile::Empty => ' ',
            Tile::Player1 => 'o',
            Tile::Player2 => 'x',
        }
    }

    pub fn is_empty(self) -> bool {
        self == Tile::Empty
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tile::Empty => f.write_str("nobody"),
            Tile::Player1 => f.write_str("player 1"),
            Tile::Player2 => f.write_str("player 2"),
        }
    }
}

const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// A 3x3 Tic-Tac-Toe board.
///
/// Player 1 always opens and turns alternate strictly. A filled cell keeps its
/// tile until [`Board::clear`]. No operation panics on bad coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [[Tile; SIZE]; SIZE],
    moves: usize,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the current player's tile at `(row, col)`.
    ///
    /// Returns the tile placed, or `None` (board untouched) when the cell is
    /// out of range or already taken.
    pub fn set(&mut self, row: usize, col: usize) -> Option<Tile> {
        let cell = self.cells.get_mut(row)?.get_mut(col)?;
        if !cell.is_empty() {
            return None;
        }

        let tile = if self.moves % 2 == 0 {
            Tile::Player1
        } else {
            Tile::Player2
        };
        *cell = tile;
        self.moves += 1;
        Some(tile)
    }

    /// Tile at `(row, col)`, `None` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<Tile> {
        self.cells.get(row)?.get(col).copied()
    }

    /// Whose move it is.
    pub fn turn(&self) -> Tile {
        if self.moves % 2 == 0 {
            Tile::Player1
        } else {
            Tile::Player2
        }
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Owner of a completed row, column or diagonal; `Tile::Empty` if none.
    pub fn is_win(&self) -> Tile {
        LINES
            .iter()
            .map(|line| line.map(|(r, c)| self.cells[r][c]))
            .find_map(|[a, b, c]| (!a.is_empty() && a == b && b == c).then_some(a))
            .unwrap_or(Tile::Empty)
    }

    pub fn winner(&self) -> Option<Tile> {
        Some(self.is_win()).filter(|tile| !tile.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.moves >= SIZE * SIZE
    }

    /// Won or drawn.
    pub fn is_over(&self) -> bool {
        self.winner().is_some() || self.is_full()
    }

    /// Empty every cell; Player 1 opens the next game.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn cells(&self) -> &[[Tile; SIZE]; SIZE] {
        &self.cells
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "+++++++++")?;
        for row in &self.cells {
            writeln!(
                f,
                "+ {} {} {} +",
                row[0].symbol(),
                row[1].symbol(),
                row[2].symbol()
            )?;
        }
        write!(f, "+++++++++")
    }
}
