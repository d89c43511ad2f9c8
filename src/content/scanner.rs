//! Lexical scanner for source files inside module archives.
//!
//! Scans source bytes in include-comments mode and counts token kinds
//! and identifier spellings. Kind labels follow the conventional names:
//! keywords and operators count under their literal text, everything
//! else under an upper-case class name (`IDENT`, `INT`, `STRING`, ...).
//! Scanning is pure and deterministic: the same bytes always produce
//! the same frequency maps.

use std::collections::HashMap;

/// Token-kind and identifier frequency counts for one or more files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStats {
    /// Count per token-kind label.
    pub token_freq: HashMap<String, i64>,
    /// Count per identifier spelling.
    pub ident_freq: HashMap<String, i64>,
}

impl TokenStats {
    fn count(&mut self, label: &str) {
        *self.token_freq.entry(label.to_string()).or_insert(0) += 1;
    }

    fn count_ident(&mut self, text: &str) {
        self.count("IDENT");
        *self.ident_freq.entry(text.to_string()).or_insert(0) += 1;
    }
}

/// Scans `src` and returns fresh frequency maps.
#[must_use]
pub fn scan(src: &[u8]) -> TokenStats {
    let mut stats = TokenStats::default();
    scan_into(src, &mut stats);
    stats
}

/// Scans `src`, accumulating counts into existing maps.
///
/// Used to fold all files of one archive into a single per-version
/// statistic.
pub fn scan_into(src: &[u8], stats: &mut TokenStats) {
    Scanner::new(src).run(stats);
}

const KEYWORDS: [&str; 25] = [
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    // Whether a newline at this point terminates a statement, per the
    // automatic-semicolon rule: set after identifiers, literals, the
    // keywords break/continue/fallthrough/return, and ++ -- ) ] }.
    pending_semi: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            pending_semi: false,
        }
    }

    fn run(&mut self, stats: &mut TokenStats) {
        loop {
            match self.peek() {
                None => {
                    if self.pending_semi {
                        stats.count(";");
                        self.pending_semi = false;
                    }
                    return;
                }
                Some(b'\n') => {
                    self.pos += 1;
                    if self.pending_semi {
                        stats.count(";");
                        self.pending_semi = false;
                    }
                }
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(c) => self.token(c, stats),
            }
        }
    }

    fn token(&mut self, first: u8, stats: &mut TokenStats) {
        match first {
            c if is_ident_start(c) => self.ident_or_keyword(stats),
            c if c.is_ascii_digit() => self.number(stats),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(stats),
            b'"' => {
                self.quoted(b'"', true);
                stats.count("STRING");
                self.pending_semi = true;
            }
            b'`' => {
                self.quoted(b'`', false);
                stats.count("STRING");
                self.pending_semi = true;
            }
            b'\'' => {
                self.quoted(b'\'', true);
                stats.count("CHAR");
                self.pending_semi = true;
            }
            b'/' if self.peek_at(1) == Some(b'/') => {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                // Statement termination is decided by the newline that
                // follows; the comment itself does not change it.
                stats.count("COMMENT");
            }
            b'/' if self.peek_at(1) == Some(b'*') => {
                let crossed_newline = self.block_comment();
                stats.count("COMMENT");
                // A comment spanning lines acts as a newline.
                if crossed_newline && self.pending_semi {
                    stats.count(";");
                    self.pending_semi = false;
                }
            }
            _ => self.operator(stats),
        }
    }

    fn ident_or_keyword(&mut self, stats: &mut TokenStats) {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if let Some(keyword) = KEYWORDS.iter().find(|k| **k == text) {
            stats.count(keyword);
            self.pending_semi = matches!(
                *keyword,
                "break" | "continue" | "fallthrough" | "return"
            );
        } else {
            stats.count_ident(&text);
            self.pending_semi = true;
        }
    }

    fn number(&mut self, stats: &mut TokenStats) {
        let mut is_float = false;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == b'_')
            {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') {
                is_float = true;
                self.pos += 1;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_hexdigit() || c == b'_')
                {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'p' | b'P')) {
                is_float = true;
                self.exponent();
            }
        } else {
            // Covers decimal plus the 0b/0o prefixes, whose digits all
            // fall in the decimal scan below via the leading zero.
            if matches!(self.peek_at(1), Some(b'b' | b'B' | b'o' | b'O'))
                && self.peek() == Some(b'0')
            {
                self.pos += 2;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') {
                is_float = true;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'e' | b'E')) {
                is_float = true;
                self.exponent();
            }
        }

        if self.peek() == Some(b'i') {
            self.pos += 1;
            stats.count("IMAG");
        } else if is_float {
            stats.count("FLOAT");
        } else {
            stats.count("INT");
        }
        self.pending_semi = true;
    }

    fn exponent(&mut self) {
        self.pos += 1;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.pos += 1;
        }
    }

    /// Consumes a quoted literal. Stops at the closing quote, an
    /// unescaped newline (for escaped literals), or EOF; malformed
    /// literals are counted like well-formed ones.
    fn quoted(&mut self, quote: u8, escapes: bool) {
        self.pos += 1;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == quote {
                return;
            }
            if escapes && c == b'\\' && self.peek().is_some() {
                self.pos += 1;
            } else if escapes && c == b'\n' {
                self.pos -= 1;
                return;
            }
        }
    }

    /// Consumes a `/* ... */` comment; returns whether it spanned lines.
    fn block_comment(&mut self) -> bool {
        self.pos += 2;
        let mut crossed = false;
        while let Some(c) = self.peek() {
            if c == b'\n' {
                crossed = true;
            }
            if c == b'*' && self.peek_at(1) == Some(b'/') {
                self.pos += 2;
                return crossed;
            }
            self.pos += 1;
        }
        crossed
    }

    fn operator(&mut self, stats: &mut TokenStats) {
        // Longest-match against the operator table; entries are ordered
        // longest first per leading byte.
        const OPERATORS: [&str; 48] = [
            "<<=", ">>=", "&^=", "...", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<",
            ">>", "&^", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=", "+", "-",
            "*", "/", "%", "&", "|", "^", "<", ">", "=", "!", "(", ")", "[", "]", "{", "}",
            ",", ";", ".", ":", "~",
        ];

        let rest = &self.src[self.pos..];
        for op in OPERATORS {
            if rest.starts_with(op.as_bytes()) {
                self.pos += op.len();
                stats.count(op);
                self.pending_semi = matches!(op, ")" | "]" | "}" | "++" | "--");
                return;
            }
        }

        self.pos += 1;
        stats.count("ILLEGAL");
        self.pending_semi = false;
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}
