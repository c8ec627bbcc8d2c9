#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokKind {
    Word(String),
    LBrace,
    RBrace,
    Semicolon,
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub line: usize,
}

impl Tok {
    pub fn text(&self) -> String {
        match &self.kind {
            TokKind::Word(w) => w.clone(),
            TokKind::LBrace => "{".to_string(),
            TokKind::RBrace => "}".to_string(),
            TokKind::Semicolon => ";".to_string(),
        }
    }
}

/// Splits the input into words and the structural tokens `{`, `}`, `;`,
/// tracking line numbers. `#` starts a comment running to end of line.
pub fn tokenize(input: &str) -> Vec<Tok> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut line = 1;
    let mut cur_line = 1;

    let flush = |cur: &mut String, tokens: &mut Vec<Tok>, cur_line: usize| {
        if !cur.is_empty() {
            tokens.push(Tok {
                kind: TokKind::Word(std::mem::take(cur)),
                line: cur_line,
            });
        }
    };

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '#' => {
                flush(&mut cur, &mut tokens, cur_line);
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '\n' => {
                flush(&mut cur, &mut tokens, cur_line);
                line += 1;
            }
            '{' | '}' | ';' => {
                flush(&mut cur, &mut tokens, cur_line);
                let kind = match c {
                    '{' => TokKind::LBrace,
                    '}' => TokKind::RBrace,
                    _ => TokKind::Semicolon,
                };
                tokens.push(Tok { kind, line });
            }
            c if c.is_whitespace() => flush(&mut cur, &mut tokens, cur_line),
            c => {
                if cur.is_empty() {
                    cur_line = line;
                }
                cur.push(c);
            }
        }
    }
    flush(&mut cur, &mut tokens, cur_line);

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_tokens_split_words() {
        let toks = tokenize("server{listen 8080;}");
        let texts: Vec<String> = toks.iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["server", "{", "listen", "8080", ";", "}"]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let toks = tokenize("listen 80; # the usual\nroot www;");
        let texts: Vec<String> = toks.iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["listen", "80", ";", "root", "www", ";"]);
        assert_eq!(toks[3].line, 2);
    }

    #[test]
    fn line_numbers_follow_newlines() {
        let toks = tokenize("a\n\nb");
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[1].line, 3);
    }
}
