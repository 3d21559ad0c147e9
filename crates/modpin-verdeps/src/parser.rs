//! Import-only scanning of Go source.
//!
//! The engine needs exactly two facts about a file: where its `package`
//! clause starts, and the literal text plus byte offset of every import path.
//! A full Go parser is overkill for that, so this module hand-rolls a small
//! scanner that understands just enough of the token stream: comments (line
//! and block), the package clause, and import declarations (single, grouped,
//! aliased, interpreted or raw string literals). Scanning stops at the first
//! declaration past the imports, mirroring `go/parser`'s imports-only mode.

/// One scanned import: the literal text including its quotes, and the byte
/// offset of the opening quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImport {
    pub literal: String,
    pub offset: usize,
}

/// The scan result for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedSource {
    /// Byte offset of the `package` keyword.
    pub package_offset: usize,
    pub imports: Vec<ScannedImport>,
}

/// Errors produced while scanning a source file.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("source is not valid UTF-8")]
    NotUtf8,

    #[error("missing package clause")]
    MissingPackageClause,

    #[error("unterminated block comment at byte {0}")]
    UnterminatedComment(usize),

    #[error("unterminated import literal at byte {0}")]
    UnterminatedLiteral(usize),

    #[error("malformed import declaration at byte {0}")]
    MalformedImport(usize),
}

/// Scans `source` for its package clause and import literals.
pub fn scan_imports(source: &[u8]) -> Result<ScannedSource, ScanError> {
    if std::str::from_utf8(source).is_err() {
        return Err(ScanError::NotUtf8);
    }

    let mut scanner = Scanner {
        src: source,
        pos: 0,
    };

    // A UTF-8 BOM is legal at the very start of a Go file.
    if source.starts_with(&[0xEF, 0xBB, 0xBF]) {
        scanner.pos = 3;
    }

    scanner.skip_trivia()?;
    let package_offset = scanner.pos;
    if !scanner.eat_keyword("package") {
        return Err(ScanError::MissingPackageClause);
    }
    scanner.skip_trivia()?;
    if scanner.eat_identifier().is_none() {
        return Err(ScanError::MissingPackageClause);
    }

    let mut imports = Vec::new();
    loop {
        scanner.skip_trivia_and_semicolons()?;
        if !scanner.eat_keyword("import") {
            break;
        }
        scanner.skip_trivia()?;

        if scanner.eat_byte(b'(') {
            // Grouped form: import ( [alias] "path" ... )
            loop {
                scanner.skip_trivia_and_semicolons()?;
                if scanner.eat_byte(b')') {
                    break;
                }
                if scanner.at_end() {
                    return Err(ScanError::MalformedImport(scanner.pos));
                }
                imports.push(scanner.scan_import_spec()?);
            }
        } else {
            imports.push(scanner.scan_import_spec()?);
        }
    }

    Ok(ScannedSource {
        package_offset,
        imports,
    })
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat_byte(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skips whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), ScanError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match memchr::memchr(b'*', &self.src[self.pos..]) {
                            Some(i) if self.src.get(self.pos + i + 1) == Some(&b'/') => {
                                self.pos += i + 2;
                                break;
                            }
                            Some(i) => self.pos += i + 1,
                            None => return Err(ScanError::UnterminatedComment(start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_trivia_and_semicolons(&mut self) -> Result<(), ScanError> {
        loop {
            self.skip_trivia()?;
            if !self.eat_byte(b';') {
                return Ok(());
            }
        }
    }

    /// Consumes `keyword` only when it is a whole token.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        if self.src.len() < end || &self.src[self.pos..end] != keyword.as_bytes() {
            return false;
        }
        if matches!(self.src.get(end), Some(b) if is_identifier_byte(*b)) {
            return false;
        }
        self.pos = end;
        true
    }

    fn eat_identifier(&mut self) -> Option<&[u8]> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_identifier_byte(b)) {
            self.pos += 1;
        }
        if self.pos > start {
            Some(&self.src[start..self.pos])
        } else {
            None
        }
    }

    /// Scans one `[alias] "path"` import spec.
    fn scan_import_spec(&mut self) -> Result<ScannedImport, ScanError> {
        self.skip_trivia()?;

        // Optional alias: an identifier, `.`, or `_`.
        match self.peek() {
            Some(b'.') => {
                self.pos += 1;
                self.skip_trivia()?;
            }
            Some(b) if is_identifier_byte(b) => {
                self.eat_identifier();
                self.skip_trivia()?;
            }
            _ => {}
        }

        let offset = self.pos;
        let quote = match self.peek() {
            Some(q @ (b'"' | b'`')) => q,
            _ => return Err(ScanError::MalformedImport(self.pos)),
        };
        self.pos += 1;

        loop {
            match self.peek() {
                None => return Err(ScanError::UnterminatedLiteral(offset)),
                Some(b'\n') if quote == b'"' => {
                    return Err(ScanError::UnterminatedLiteral(offset))
                }
                Some(b'\\') if quote == b'"' => self.pos += 2,
                Some(b) => {
                    self.pos += 1;
                    if b == quote {
                        break;
                    }
                }
            }
        }

        let literal = String::from_utf8(self.src[offset..self.pos].to_vec())
            .map_err(|_| ScanError::NotUtf8)?;
        Ok(ScannedImport { literal, offset })
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
