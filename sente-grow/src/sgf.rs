//! Minimal SGF reading, just enough for the bonus-file contract: walk every
//! variation of a record and collect the positions whose comment carries a
//! `BONUS <number>` annotation.

use board_game::board::Player;
use board_game::games::go::{FlatTile, Move};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SgfError {
    #[error("malformed sgf: {0}")]
    Malformed(String),
    #[error("unsupported sgf: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Default)]
struct SgfNode {
    properties: Vec<(String, Vec<String>)>,
}

impl SgfNode {
    fn value(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, values)| values.first())
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
struct SgfTree {
    nodes: Vec<SgfNode>,
    children: Vec<SgfTree>,
}

/// A position annotated with a bonus: the move sequence from the initial
/// position and the annotated value.
#[derive(Debug, Clone)]
pub struct BonusPosition {
    pub moves: Vec<(Player, Move)>,
    pub bonus: f64,
}

#[derive(Debug)]
pub struct SgfScan {
    pub size: u8,
    pub first_player: Player,
    pub bonus_positions: Vec<BonusPosition>,
}

/// Parse an SGF text and collect all `BONUS` annotations across every
/// variation. Setup stones are not supported.
pub fn scan_bonus_file(text: &str) -> Result<SgfScan, SgfError> {
    let tree = parse(text)?;

    let size: u8 = tree
        .nodes
        .first()
        .and_then(|node| node.value("SZ"))
        .ok_or_else(|| SgfError::Malformed("missing SZ property".to_string()))?
        .parse()
        .map_err(|_| SgfError::Malformed("invalid SZ property".to_string()))?;

    let mut scan = SgfScan {
        size,
        first_player: Player::A,
        bonus_positions: vec![],
    };
    let mut first_seen = false;
    let mut moves = vec![];
    walk(&tree, size, &mut moves, &mut scan, &mut first_seen)?;
    Ok(scan)
}

fn walk(
    tree: &SgfTree,
    size: u8,
    moves: &mut Vec<(Player, Move)>,
    scan: &mut SgfScan,
    first_seen: &mut bool,
) -> Result<(), SgfError> {
    let depth_before = moves.len();

    for node in &tree.nodes {
        for (key, values) in &node.properties {
            match key.as_str() {
                "AB" | "AW" | "AE" => {
                    return Err(SgfError::Unsupported("setup stones are not supported".to_string()));
                }
                "B" | "W" => {
                    let player = if key == "B" { Player::A } else { Player::B };
                    if !*first_seen {
                        scan.first_player = player;
                        *first_seen = true;
                    }
                    let coord = values.first().map(|s| s.as_str()).unwrap_or("");
                    moves.push((player, parse_move(coord, size)?));
                }
                _ => {}
            }
        }

        if let Some(comment) = node.value("C") {
            if let Some(bonus) = parse_bonus(comment) {
                scan.bonus_positions.push(BonusPosition {
                    moves: moves.clone(),
                    bonus,
                });
            }
        }
    }

    for child in &tree.children {
        walk(child, size, moves, scan, first_seen)?;
    }

    moves.truncate(depth_before);
    Ok(())
}

fn parse_move(coord: &str, size: u8) -> Result<Move, SgfError> {
    if coord.is_empty() || (coord == "tt" && size <= 19) {
        return Ok(Move::Pass);
    }
    let bytes = coord.as_bytes();
    if bytes.len() != 2 {
        return Err(SgfError::Malformed(format!("bad coordinate '{}'", coord)));
    }
    let x = bytes[0].wrapping_sub(b'a');
    let y = bytes[1].wrapping_sub(b'a');
    if x >= size || y >= size {
        return Err(SgfError::Malformed(format!("coordinate '{}' outside board", coord)));
    }
    let flat = y as u16 * size as u16 + x as u16;
    Ok(Move::Place(FlatTile::new(flat).to_tile(size)))
}

fn parse_bonus(comment: &str) -> Option<f64> {
    let start = comment.find("BONUS")?;
    let rest = comment[start + "BONUS".len()..].trim_start();
    let token: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
        .collect();
    token.parse().ok()
}

/// Recursive-descent SGF parser: `(` sequence of `;node`s, nested variations, `)`.
fn parse(text: &str) -> Result<SgfTree, SgfError> {
    let bytes = text.as_bytes();
    let mut pos = 0;

    skip_whitespace(bytes, &mut pos);
    let tree = parse_tree(bytes, &mut pos)?;
    Ok(tree)
}

fn parse_tree(bytes: &[u8], pos: &mut usize) -> Result<SgfTree, SgfError> {
    expect(bytes, pos, b'(')?;

    let mut nodes = vec![];
    let mut children = vec![];

    loop {
        skip_whitespace(bytes, pos);
        match bytes.get(*pos) {
            Some(b';') => {
                *pos += 1;
                nodes.push(parse_node(bytes, pos)?);
            }
            Some(b'(') => {
                children.push(parse_tree(bytes, pos)?);
            }
            Some(b')') => {
                *pos += 1;
                return Ok(SgfTree { nodes, children });
            }
            Some(&c) => {
                return Err(SgfError::Malformed(format!("unexpected byte '{}'", c as char)));
            }
            None => return Err(SgfError::Malformed("unexpected end of input".to_string())),
        }
    }
}

fn parse_node(bytes: &[u8], pos: &mut usize) -> Result<SgfNode, SgfError> {
    let mut node = SgfNode::default();

    loop {
        skip_whitespace(bytes, pos);
        match bytes.get(*pos) {
            Some(c) if c.is_ascii_uppercase() => {
                let start = *pos;
                while bytes.get(*pos).map_or(false, |c| c.is_ascii_alphabetic()) {
                    *pos += 1;
                }
                let key = std::str::from_utf8(&bytes[start..*pos])
                    .expect("Key bytes are ascii")
                    .to_string();

                let mut values = vec![];
                loop {
                    skip_whitespace(bytes, pos);
                    if bytes.get(*pos) != Some(&b'[') {
                        break;
                    }
                    *pos += 1;
                    let mut value = String::new();
                    loop {
                        match bytes.get(*pos) {
                            Some(b'\\') => {
                                if let Some(&c) = bytes.get(*pos + 1) {
                                    value.push(c as char);
                                    *pos += 2;
                                } else {
                                    return Err(SgfError::Malformed("dangling escape".to_string()));
                                }
                            }
                            Some(b']') => {
                                *pos += 1;
                                break;
                            }
                            Some(&c) => {
                                value.push(c as char);
                                *pos += 1;
                            }
                            None => return Err(SgfError::Malformed("unterminated value".to_string())),
                        }
                    }
                    values.push(value);
                }
                node.properties.push((key, values));
            }
            _ => return Ok(node),
        }
    }
}

fn skip_whitespace(bytes: &[u8], pos: &mut usize) {
    while bytes.get(*pos).map_or(false, |c| c.is_ascii_whitespace()) {
        *pos += 1;
    }
}

fn expect(bytes: &[u8], pos: &mut usize, expected: u8) -> Result<(), SgfError> {
    if bytes.get(*pos) == Some(&expected) {
        *pos += 1;
        Ok(())
    } else {
        Err(SgfError::Malformed(format!("expected '{}'", expected as char)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_with_bonus() {
        let text = "(;GM[1]SZ[9];B[dd];W[ee]C[interesting BONUS 1.5 here];B[cc])";
        let scan = scan_bonus_file(text).unwrap();

        assert_eq!(scan.size, 9);
        assert_eq!(scan.first_player, Player::A);
        assert_eq!(scan.bonus_positions.len(), 1);

        let pos = &scan.bonus_positions[0];
        assert_eq!(pos.bonus, 1.5);
        assert_eq!(pos.moves.len(), 2);
        assert_eq!(pos.moves[0].0, Player::A);
        assert_eq!(pos.moves[1].0, Player::B);
    }

    #[test]
    fn variations_each_get_scanned() {
        let text = "(;SZ[5];B[aa](;W[bb]C[BONUS 2])(;W[cc]C[BONUS -0.5]))";
        let scan = scan_bonus_file(text).unwrap();
        assert_eq!(scan.bonus_positions.len(), 2);
        assert_eq!(scan.bonus_positions[0].bonus, 2.0);
        assert_eq!(scan.bonus_positions[1].bonus, -0.5);
        // both variations are one move deep past the shared prefix
        assert_eq!(scan.bonus_positions[0].moves.len(), 2);
        assert_eq!(scan.bonus_positions[1].moves.len(), 2);
    }

    #[test]
    fn pass_moves_parse() {
        let text = "(;SZ[9];B[];W[tt]C[BONUS 1])";
        let scan = scan_bonus_file(text).unwrap();
        let moves = &scan.bonus_positions[0].moves;
        assert_eq!(moves[0].1, Move::Pass);
        assert_eq!(moves[1].1, Move::Pass);
    }

    #[test]
    fn setup_stones_rejected() {
        let text = "(;SZ[9]AB[dd][ee];B[cc])";
        assert!(scan_bonus_file(text).is_err());
    }

    #[test]
    fn comments_without_bonus_are_ignored() {
        let text = "(;SZ[9];B[aa]C[just a comment];W[bb])";
        let scan = scan_bonus_file(text).unwrap();
        assert!(scan.bonus_positions.is_empty());
    }
}
