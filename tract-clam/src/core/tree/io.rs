//! Reading and writing dendrograms as text.
//!
//! Every line describes one node, in id order:
//!
//! ```text
//! (0, (3))
//! (2, (0, 1, 2), (4, 2), 0.75)
//! ```
//!
//! Leaves have level 0 and take the next id whatever they list; the writer
//! lists the id itself. Merged nodes list their level, their leaves, their
//! two children and a payload.

use std::io::{BufRead, Write};

use super::{HierarchicalTree, TreeError};

/// A piece of a dendrogram line.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `(`
    Open,
    /// `)`
    Close,
    /// Anything between parentheses and commas.
    Value(String),
}

/// Splits a line into parentheses and comma-separated values.
fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut value = String::new();

    let flush = |value: &mut String, tokens: &mut Vec<Token>| {
        if !value.is_empty() {
            tokens.push(Token::Value(std::mem::take(value)));
        }
    };

    for c in line.chars() {
        match c {
            '(' => {
                flush(&mut value, &mut tokens);
                tokens.push(Token::Open);
            }
            ')' => {
                flush(&mut value, &mut tokens);
                tokens.push(Token::Close);
            }
            ',' => flush(&mut value, &mut tokens),
            c if c.is_whitespace() => (),
            c => value.push(c),
        }
    }
    flush(&mut value, &mut tokens);

    tokens
}

/// Walks the tokens of one line.
struct Cursor<'a> {
    /// The tokens of the line.
    tokens: &'a [Token],
    /// The position of the next token.
    position: usize,
    /// The one-based line number, for errors.
    line: usize,
}

impl Cursor<'_> {
    /// A parse error at the current line.
    fn error(&self, message: &str) -> TreeError {
        TreeError::Parse {
            line: self.line,
            message: message.to_string(),
        }
    }

    /// Consumes the next token if it is `expected`.
    fn expect(&mut self, expected: &Token) -> Result<(), TreeError> {
        match self.tokens.get(self.position) {
            Some(t) if t == expected => {
                self.position += 1;
                Ok(())
            }
            Some(t) => Err(self.error(&format!("Expected {expected:?}, found {t:?}."))),
            None => Err(self.error(&format!("Expected {expected:?} at the end of the line."))),
        }
    }

    /// Whether the next token is `token`.
    fn peek_is(&self, token: &Token) -> bool {
        self.tokens.get(self.position) == Some(token)
    }

    /// Consumes the next token as a value of type `T`.
    fn value<T: std::str::FromStr>(&mut self) -> Result<T, TreeError> {
        match self.tokens.get(self.position) {
            Some(Token::Value(v)) => {
                self.position += 1;
                v.parse().map_err(|_| self.error(&format!("Cannot read {v:?}.")))
            }
            Some(t) => Err(self.error(&format!("Expected a value, found {t:?}."))),
            None => Err(self.error("Expected a value at the end of the line.")),
        }
    }

    /// Consumes a parenthesized list of values.
    fn list<T: std::str::FromStr>(&mut self) -> Result<Vec<T>, TreeError> {
        self.expect(&Token::Open)?;
        let mut values = Vec::new();
        while !self.peek_is(&Token::Close) {
            values.push(self.value()?);
        }
        self.expect(&Token::Close)?;
        Ok(values)
    }

    /// Fails if tokens are left.
    fn finish(&self) -> Result<(), TreeError> {
        if self.position == self.tokens.len() {
            Ok(())
        } else {
            Err(self.error("Unexpected tokens at the end of the line."))
        }
    }
}

impl HierarchicalTree {
    /// Reads a dendrogram in the text format, skipping blank lines.
    ///
    /// The contents of a leaf line are not checked.
    ///
    /// The level and leaves stored for every merged node are checked against
    /// the ones computed from its children.
    ///
    /// # Errors
    ///
    /// * If a line cannot be read or parsed.
    /// * If a leaf follows a merged node, or a merge is invalid.
    /// * If a stored level or leaf set disagrees with the children.
    pub fn from_ascii<R: BufRead>(reader: R) -> Result<Self, TreeError> {
        let mut tree = Self::new();

        for (i, line) in reader.lines().enumerate() {
            let line_number = i + 1;
            let line = line.map_err(|e| TreeError::Parse {
                line: line_number,
                message: e.to_string(),
            })?;
            let tokens = tokenize(&line);
            if tokens.is_empty() {
                continue;
            }

            let mut cursor = Cursor {
                tokens: &tokens,
                position: 0,
                line: line_number,
            };
            cursor.expect(&Token::Open)?;
            let level = cursor.value::<usize>()?;

            if level == 0 {
                if cursor.peek_is(&Token::Open) {
                    cursor.list::<String>()?;
                }
                cursor.expect(&Token::Close)?;
                cursor.finish()?;

                tree.add_leaf().ok_or_else(|| cursor.error("Leaves must come before merged nodes."))?;
            } else {
                let mut leaves = cursor.list::<usize>()?;
                let children = cursor.list::<usize>()?;
                let custom_data = cursor.value::<f32>()?;
                cursor.expect(&Token::Close)?;
                cursor.finish()?;

                let [c1, c2] = children[..] else {
                    return Err(cursor.error(&format!("Expected two children, found {}.", children.len())));
                };
                let id = tree.add_cluster(c1, c2, custom_data).map_err(|e| cursor.error(&e.to_string()))?;

                let node = &tree.nodes[id];
                if node.level != level {
                    return Err(cursor.error(&format!("Stored level {level} but the children give {}.", node.level)));
                }
                let mut computed = node.leaves.clone();
                computed.sort_unstable();
                leaves.sort_unstable();
                if computed != leaves {
                    return Err(cursor.error("The stored leaves differ from the children's leaves."));
                }
            }
        }

        Ok(tree)
    }

    /// Writes the tree in the text format read by `from_ascii`.
    ///
    /// # Errors
    ///
    /// * If writing fails.
    pub fn write_ascii<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for (id, node) in self.nodes.iter().enumerate() {
            match node.children {
                None => writeln!(writer, "(0, ({id}))")?,
                Some((c1, c2)) => {
                    let leaves = node.leaves.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                    writeln!(writer, "({}, ({leaves}), ({c1}, {c2}), {})", node.level, node.custom_data)?;
                }
            }
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, Token};
    use crate::{HierarchicalTree, TreeError};

    const DENDROGRAM: &str = "(0, (0))
(0, (1))
(0, (2))

(1, (0, 1), (0, 1), 0.5)
(2, (0, 1, 2), (3, 2), 0.7)
";

    #[test]
    fn tokens() {
        let tokens = tokenize("(1, (0,1), (0, 1), 0.5)");
        assert_eq!(tokens.len(), 12);
        assert_eq!(tokens[0], Token::Open);
        assert_eq!(tokens[1], Token::Value("1".to_string()));
        assert_eq!(tokens[10], Token::Value("0.5".to_string()));
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn read() {
        let tree = HierarchicalTree::from_ascii(DENDROGRAM.as_bytes()).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.cluster_count(), 5);
        assert_eq!(tree.children(4), Ok(Some((3, 2))));
        assert_eq!(tree.custom_data(4), Ok(0.7));
        assert_eq!(tree.max_level(), 2);
    }

    #[test]
    fn leaf_lines_take_the_next_id() {
        let text = "(0, (17))\n(0)\n(0, (a, b))\n(1, (1, 2), (1, 2), 0.25)\n";
        let tree = HierarchicalTree::from_ascii(text.as_bytes()).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.leaves_for_cluster(0), Ok([0].as_slice()));
        assert_eq!(tree.leaves_for_cluster(3), Ok([1, 2].as_slice()));
    }

    #[test]
    fn round_trip() {
        let tree = HierarchicalTree::from_ascii(DENDROGRAM.as_bytes()).unwrap_or_else(|e| unreachable!("{e}"));
        let mut text = Vec::new();
        tree.write_ascii(&mut text).unwrap_or_else(|e| unreachable!("{e}"));
        let reread = HierarchicalTree::from_ascii(text.as_slice()).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree, reread);
    }

    #[test]
    fn inconsistent_lines() {
        let wrong_level = "(0, (0))\n(0, (1))\n(2, (0, 1), (0, 1), 0.5)\n";
        assert!(matches!(
            HierarchicalTree::from_ascii(wrong_level.as_bytes()),
            Err(TreeError::Parse { line: 3, .. })
        ));

        let wrong_leaves = "(0, (0))\n(0, (1))\n(1, (0, 2), (0, 1), 0.5)\n";
        assert!(matches!(
            HierarchicalTree::from_ascii(wrong_leaves.as_bytes()),
            Err(TreeError::Parse { line: 3, .. })
        ));

        let late_leaf = "(0, (0))\n(0, (1))\n(1, (0, 1), (0, 1), 0.5)\n(0, (3))\n";
        assert!(matches!(
            HierarchicalTree::from_ascii(late_leaf.as_bytes()),
            Err(TreeError::Parse { line: 4, .. })
        ));

        let unclosed_leaf = "(0, (0))\n(0, (1)\n";
        assert!(matches!(
            HierarchicalTree::from_ascii(unclosed_leaf.as_bytes()),
            Err(TreeError::Parse { line: 2, .. })
        ));

        let garbage = "(0, (0))\n(one, (1))\n";
        assert!(matches!(
            HierarchicalTree::from_ascii(garbage.as_bytes()),
            Err(TreeError::Parse { line: 2, .. })
        ));
    }
}
