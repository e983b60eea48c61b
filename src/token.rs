//! On-demand tokenizer over a byte source: a file, an executable string, or
//! the body handed to the `token` operator. One call extracts one PostScript
//! object.

use log::warn;

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    filters,
    object::{DictKey, FileId, Object, StringSlice},
};

const FORM_FEED: u8 = b'\x0c';

pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | FORM_FEED | b'\r' | b' ')
}

pub fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b) && !(128..=159).contains(&b)
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Str(StringSlice),
    File(FileId),
}

enum RawToken {
    Obj(Object),
    ProcStart,
    ProcEnd,
}

/// A tokenizer positioned inside one byte source. The cursor is local to the
/// source window; `consumed()` reports how far it advanced so the execution
/// engine can shrink an executable string or commit a file position.
#[derive(Debug)]
pub struct Tokenizer {
    src: Source,
    cursor: usize,
}

impl Tokenizer {
    pub fn for_string(slice: StringSlice) -> Self {
        Self {
            src: Source::Str(slice),
            cursor: 0,
        }
    }

    pub fn for_file(ctx: &Context, id: FileId) -> PsResult<Self> {
        Ok(Self {
            src: Source::File(id),
            cursor: ctx.files().cursor(id)?,
        })
    }

    pub fn consumed(&self) -> usize {
        self.cursor
    }

    /// Commits a file source's cursor back into the file table.
    pub fn commit(&self, ctx: &mut Context) -> PsResult<()> {
        if let Source::File(id) = self.src {
            ctx.files_mut().set_cursor(id, self.cursor)?;
        }
        Ok(())
    }

    fn byte_at(&self, ctx: &Context, pos: usize) -> Option<u8> {
        match self.src {
            Source::Str(slice) => {
                if pos < slice.len {
                    Some(ctx.vm().string_bytes(slice)[pos])
                } else {
                    None
                }
            }
            Source::File(id) => ctx.files().byte_at(id, pos),
        }
    }

    fn peek(&self, ctx: &Context) -> Option<u8> {
        self.byte_at(ctx, self.cursor)
    }

    fn peek_offset(&self, ctx: &Context, offset: usize) -> Option<u8> {
        self.byte_at(ctx, self.cursor + offset)
    }

    fn next_byte(&mut self, ctx: &Context) -> Option<u8> {
        let byte = self.peek(ctx);
        if byte.is_some() {
            self.cursor += 1;
        }
        byte
    }

    fn skip_whitespace(&mut self, ctx: &Context) {
        while let Some(b) = self.peek(ctx) {
            if is_whitespace(b) {
                self.cursor += 1;
            } else if b == b'%' {
                // comment to end of line
                self.cursor += 1;
                while let Some(b) = self.peek(ctx) {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                    self.cursor += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Extracts the next object, or None at end of source.
    pub fn next_token(&mut self, ctx: &mut Context) -> PsResult<Option<Object>> {
        let token = match self.next_raw(ctx)? {
            None => None,
            Some(RawToken::Obj(obj)) => Some(obj),
            Some(RawToken::ProcStart) => Some(self.finish_procedure(ctx)?),
            Some(RawToken::ProcEnd) => anyhow::bail!(ErrorKind::SyntaxError),
        };

        self.commit(ctx)?;
        Ok(token)
    }

    fn finish_procedure(&mut self, ctx: &mut Context) -> PsResult<Object> {
        let mut body = Vec::new();

        loop {
            match self.next_raw(ctx)? {
                // an unterminated procedure is a syntax error
                None => anyhow::bail!(ErrorKind::SyntaxError),
                Some(RawToken::ProcEnd) => break,
                Some(RawToken::ProcStart) => body.push(self.finish_procedure(ctx)?),
                Some(RawToken::Obj(obj)) => body.push(obj),
            }
        }

        Ok(if ctx.packing_mode {
            ctx.alloc_packed_obj(body)
        } else {
            ctx.alloc_proc_obj(body)
        })
    }

    fn next_raw(&mut self, ctx: &mut Context) -> PsResult<Option<RawToken>> {
        self.skip_whitespace(ctx);

        let byte = match self.peek(ctx) {
            Some(b) => b,
            None => return Ok(None),
        };

        Ok(Some(match byte {
            b'(' => {
                self.cursor += 1;
                let bytes = self.lex_paren_string(ctx)?;
                RawToken::Obj(ctx.alloc_string_obj(bytes))
            }
            b'<' => match self.peek_offset(ctx, 1) {
                Some(b'<') => {
                    self.cursor += 2;
                    RawToken::Obj(Object::executable_name(b"<<"))
                }
                Some(b'~') => {
                    self.cursor += 2;
                    let bytes = self.lex_ascii85(ctx)?;
                    RawToken::Obj(ctx.alloc_string_obj(bytes))
                }
                _ => {
                    self.cursor += 1;
                    let bytes = self.lex_hex_string(ctx)?;
                    RawToken::Obj(ctx.alloc_string_obj(bytes))
                }
            },
            b'>' => {
                if self.peek_offset(ctx, 1) == Some(b'>') {
                    self.cursor += 2;
                    RawToken::Obj(Object::executable_name(b">>"))
                } else {
                    anyhow::bail!(ErrorKind::SyntaxError);
                }
            }
            b'[' | b']' => {
                self.cursor += 1;
                RawToken::Obj(Object::executable_name(&[byte]))
            }
            b'{' => {
                self.cursor += 1;
                RawToken::ProcStart
            }
            b'}' => {
                self.cursor += 1;
                RawToken::ProcEnd
            }
            b')' => anyhow::bail!(ErrorKind::SyntaxError),
            b'/' => {
                self.cursor += 1;
                let immediate = self.peek(ctx) == Some(b'/');
                if immediate {
                    self.cursor += 1;
                }
                let name = self.lex_regular_run(ctx);
                if immediate {
                    // //name binds at tokenization time
                    match ctx.lookup(&DictKey::name(&name)) {
                        Some(obj) => RawToken::Obj(obj),
                        None => anyhow::bail!(ErrorKind::Undefined),
                    }
                } else {
                    RawToken::Obj(Object::literal_name(&name))
                }
            }
            128..=159 => self.lex_binary_token(ctx, byte)?,
            _ => {
                let run = self.lex_regular_run(ctx);
                match parse_number(&run) {
                    Some(obj) => RawToken::Obj(obj),
                    None => RawToken::Obj(Object::executable_name(&run)),
                }
            }
        }))
    }

    fn lex_regular_run(&mut self, ctx: &Context) -> Vec<u8> {
        let mut run = Vec::new();
        while let Some(b) = self.peek(ctx) {
            if !is_regular(b) {
                break;
            }
            run.push(b);
            self.cursor += 1;
        }
        run
    }

    /// Literal string body after the opening paren: balanced parens, backslash
    /// escapes, line-ending normalization.
    fn lex_paren_string(&mut self, ctx: &Context) -> PsResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut depth = 1usize;

        loop {
            let byte = match self.next_byte(ctx) {
                Some(b) => b,
                None => anyhow::bail!(ErrorKind::SyntaxError),
            };

            match byte {
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(byte);
                }
                b'\r' => {
                    // raw CR and CRLF both read back as LF
                    if self.peek(ctx) == Some(b'\n') {
                        self.cursor += 1;
                    }
                    out.push(b'\n');
                }
                b'\\' => {
                    let escaped = match self.next_byte(ctx) {
                        Some(b) => b,
                        None => anyhow::bail!(ErrorKind::SyntaxError),
                    };
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(FORM_FEED),
                        b'\\' | b'(' | b')' => out.push(escaped),
                        b'\n' => {}
                        b'\r' => {
                            // line continuation swallows CRLF too
                            if self.peek(ctx) == Some(b'\n') {
                                self.cursor += 1;
                            }
                        }
                        b'0'..=b'7' => {
                            let mut value = (escaped - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek(ctx) {
                                    Some(digit @ b'0'..=b'7') => {
                                        value = value * 8 + (digit - b'0') as u32;
                                        self.cursor += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push(value as u8);
                        }
                        // \ of anything else yields the character itself
                        other => out.push(other),
                    }
                }
                _ => out.push(byte),
            }
        }
    }

    fn lex_hex_string(&mut self, ctx: &Context) -> PsResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            match self.next_byte(ctx) {
                Some(b'>') => break,
                Some(byte) => body.push(byte),
                None => anyhow::bail!(ErrorKind::SyntaxError),
            }
        }
        filters::decode_hex_body(&body)
    }

    fn lex_ascii85(&mut self, ctx: &Context) -> PsResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            match self.next_byte(ctx) {
                Some(b'~') => match self.next_byte(ctx) {
                    Some(b'>') => break,
                    _ => anyhow::bail!(ErrorKind::SyntaxError),
                },
                Some(byte) => body.push(byte),
                None => anyhow::bail!(ErrorKind::SyntaxError),
            }
        }
        filters::decode_ascii85_body(&body)
    }

    fn take_bytes(&mut self, ctx: &Context, n: usize) -> PsResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next_byte(ctx) {
                Some(b) => bytes.push(b),
                None => anyhow::bail!(ErrorKind::SyntaxError),
            }
        }
        Ok(bytes)
    }

    /// Binary tokens, codes 128-159. Codes 132-144 are the typed scalar and
    /// string tokens; 128-131 (binary object sequences), the system name
    /// tokens and the reserved codes are rejected.
    fn lex_binary_token(&mut self, ctx: &mut Context, code: u8) -> PsResult<RawToken> {
        self.cursor += 1;

        let int_from = |bytes: &[u8], hi: bool| -> i32 {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            if hi {
                i32::from_be_bytes(buf)
            } else {
                i32::from_le_bytes(buf)
            }
        };

        Ok(RawToken::Obj(match code {
            132 | 133 => {
                let bytes = self.take_bytes(ctx, 4)?;
                Object::int(int_from(&bytes, code == 132))
            }
            134 | 135 => {
                let bytes = self.take_bytes(ctx, 2)?;
                let buf = [bytes[0], bytes[1]];
                let value = if code == 134 {
                    i16::from_be_bytes(buf)
                } else {
                    i16::from_le_bytes(buf)
                };
                Object::int(value as i32)
            }
            136 => {
                let bytes = self.take_bytes(ctx, 1)?;
                Object::int(bytes[0] as i8 as i32)
            }
            137 => {
                // fixed point: representation byte carries the scale and order
                let rep = self.take_bytes(ctx, 1)?[0];
                let (scale, hi) = match rep {
                    0..=31 => (rep, true),
                    128..=159 => (rep - 128, false),
                    _ => anyhow::bail!(ErrorKind::SyntaxError),
                };
                let bytes = self.take_bytes(ctx, 4)?;
                let raw = int_from(&bytes, hi);
                if scale == 0 {
                    Object::int(raw)
                } else {
                    Object::real(raw as f32 / (1u32 << scale) as f32)
                }
            }
            138 | 139 => {
                let bytes = self.take_bytes(ctx, 4)?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                let value = if code == 138 {
                    f32::from_be_bytes(buf)
                } else {
                    f32::from_le_bytes(buf)
                };
                Object::real(value)
            }
            140 => {
                let bytes = self.take_bytes(ctx, 4)?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                Object::real(f32::from_ne_bytes(buf))
            }
            141 => {
                let bytes = self.take_bytes(ctx, 1)?;
                Object::bool(bytes[0] != 0)
            }
            142 => {
                let len = self.take_bytes(ctx, 1)?[0] as usize;
                let bytes = self.take_bytes(ctx, len)?;
                ctx.alloc_string_obj(bytes)
            }
            143 | 144 => {
                let lens = self.take_bytes(ctx, 2)?;
                let buf = [lens[0], lens[1]];
                let len = if code == 143 {
                    u16::from_be_bytes(buf)
                } else {
                    u16::from_le_bytes(buf)
                } as usize;
                let bytes = self.take_bytes(ctx, len)?;
                ctx.alloc_string_obj(bytes)
            }
            145 | 146 => {
                warn!("system name binary tokens are not supported");
                anyhow::bail!(ErrorKind::SyntaxError);
            }
            128..=131 => {
                warn!("binary object sequences are not supported");
                anyhow::bail!(ErrorKind::SyntaxError);
            }
            _ => anyhow::bail!(ErrorKind::SyntaxError),
        }))
    }
}

/// Number classification of a regular-character run. Returns None when the
/// run is an executable name instead.
fn parse_number(run: &[u8]) -> Option<Object> {
    if run.is_empty() {
        return None;
    }

    // radix integer: base#digits
    if let Some(pos) = run.iter().position(|&b| b == b'#') {
        let base: u32 = std::str::from_utf8(&run[..pos]).ok()?.parse().ok()?;
        if !(2..=36).contains(&base) || pos + 1 >= run.len() {
            return None;
        }
        let digits = std::str::from_utf8(&run[pos + 1..]).ok()?;
        let value = u64::from_str_radix(digits, base).ok()?;
        if value > u32::MAX as u64 {
            return None;
        }
        return Some(Object::int(value as u32 as i32));
    }

    // reject runs with characters a number cannot contain; this also keeps
    // Rust's float parser from accepting "inf" and "NaN" spellings
    if !run
        .iter()
        .all(|&b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    if !run.iter().any(|&b| b.is_ascii_digit()) {
        return None;
    }

    let text = std::str::from_utf8(run).ok()?;

    if run.iter().all(|&b| b.is_ascii_digit() || matches!(b, b'+' | b'-')) {
        // integer form; a literal exceeding the 32-bit range promotes to real
        if let Ok(value) = text.parse::<i32>() {
            return Some(Object::int(value));
        }
        if let Ok(value) = text.parse::<f64>() {
            return Some(Object::real(value as f32));
        }
        return None;
    }

    text.parse::<f64>().ok().map(|value| Object::real(value as f32))
}

/// Tokenizes an executable string object in place: returns the next token
/// plus the remaining (shrunk) slice, or None when the string is exhausted.
pub fn token_from_string(
    ctx: &mut Context,
    slice: StringSlice,
) -> PsResult<Option<(Object, StringSlice)>> {
    let mut tokenizer = Tokenizer::for_string(slice);
    let token = tokenizer.next_token(ctx)?;

    Ok(token.map(|obj| {
        let consumed = tokenizer.consumed().min(slice.len);
        let rest = StringSlice {
            idx: slice.idx,
            start: slice.start + consumed,
            len: slice.len - consumed,
            global: slice.global,
        };
        (obj, rest)
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object::Value;

    fn tokenize_all(input: &[u8]) -> (Context, Vec<Object>) {
        let mut ctx = Context::new(true);
        let slice = match ctx.alloc_string_obj(input.to_vec()).value {
            Value::String(s) => s,
            _ => unreachable!(),
        };

        let mut tokenizer = Tokenizer::for_string(slice);
        let mut tokens = Vec::new();
        while let Some(token) = tokenizer.next_token(&mut ctx).unwrap() {
            tokens.push(token);
        }
        (ctx, tokens)
    }

    #[test]
    fn integers_and_reals() {
        let (_, tokens) = tokenize_all(b"42 -17 3.14 -.002 1e3 6.02E23");
        assert_eq!(tokens[0].value, Value::Int(42));
        assert_eq!(tokens[1].value, Value::Int(-17));
        assert_eq!(tokens[2].value, Value::Real(3.14));
        assert_eq!(tokens[3].value, Value::Real(-0.002));
        assert_eq!(tokens[4].value, Value::Real(1000.0));
        assert_eq!(tokens[5].value, Value::Real(6.02e23));
    }

    #[test]
    fn radix_integers() {
        let (_, tokens) = tokenize_all(b"8#1777 16#FFFE 2#1000");
        assert_eq!(tokens[0].value, Value::Int(0o1777));
        assert_eq!(tokens[1].value, Value::Int(0xFFFE));
        assert_eq!(tokens[2].value, Value::Int(8));
    }

    #[test]
    fn radix_wraps_to_negative_like_unsigned() {
        let (_, tokens) = tokenize_all(b"16#FFFFFFFF");
        assert_eq!(tokens[0].value, Value::Int(-1));
    }

    #[test]
    fn integer_overflow_promotes_to_real() {
        let (_, tokens) = tokenize_all(b"2147483647 2147483648");
        assert_eq!(tokens[0].value, Value::Int(2147483647));
        assert_eq!(tokens[1].value, Value::Real(2147483648.0));
    }

    #[test]
    fn number_like_names_stay_names() {
        let (_, tokens) = tokenize_all(b"- 1.2.3 e5");
        for token in &tokens {
            assert!(matches!(token.value, Value::Name(_)), "{:?}", token);
        }
    }

    #[test]
    fn literal_string_with_escapes() {
        let (ctx, tokens) = tokenize_all(br"(a\(b\)c \101 \n\t)");
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"a(b)c A \n\t");
    }

    #[test]
    fn nested_parens_balance() {
        let (ctx, tokens) = tokenize_all(b"(outer (inner) tail)");
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"outer (inner) tail");
    }

    #[test]
    fn string_line_continuation() {
        let (ctx, tokens) = tokenize_all(b"(ab\\\ncd)");
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"abcd");
    }

    #[test]
    fn unterminated_string_is_syntaxerror() {
        let mut ctx = Context::new(true);
        let slice = match ctx.alloc_string_obj(b"(oops".to_vec()).value {
            Value::String(s) => s,
            _ => unreachable!(),
        };
        let mut tokenizer = Tokenizer::for_string(slice);
        let err = tokenizer.next_token(&mut ctx).unwrap_err();
        assert_eq!(err.downcast_ref::<ErrorKind>(), Some(&ErrorKind::SyntaxError));
    }

    #[test]
    fn hex_string_with_odd_digit() {
        let (ctx, tokens) = tokenize_all(b"<901fa>");
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), &[0x90, 0x1f, 0xa0]);
    }

    #[test]
    fn ascii85_string() {
        let (ctx, tokens) = tokenize_all(b"<~9jqo^F*2M7/c~>");
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"Man sure.");
    }

    #[test]
    fn names_and_literal_names() {
        let (_, tokens) = tokenize_all(b"moveto /x");
        assert!(tokens[0].is_executable());
        assert_eq!(tokens[0].name_val().unwrap().as_bytes(), b"moveto");
        assert!(!tokens[1].is_executable());
        assert_eq!(tokens[1].name_val().unwrap().as_bytes(), b"x");
    }

    #[test]
    fn procedure_becomes_executable_array() {
        let (ctx, tokens) = tokenize_all(b"{1 2 add}");
        assert!(tokens[0].is_procedure());
        let body = ctx.vm().array(tokens[0].array_val().unwrap());
        assert_eq!(body.len(), 3);
        assert_eq!(body[0].value, Value::Int(1));
    }

    #[test]
    fn nested_procedures() {
        let (ctx, tokens) = tokenize_all(b"{ {1} {2} ifelse }");
        let body = ctx.vm().array(tokens[0].array_val().unwrap());
        assert_eq!(body.len(), 3);
        assert!(body[0].is_procedure());
        assert!(body[1].is_procedure());
    }

    #[test]
    fn comments_are_skipped() {
        let (_, tokens) = tokenize_all(b"1 % comment to eol\n2");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].value, Value::Int(2));
    }

    #[test]
    fn dict_mark_tokens() {
        let (_, tokens) = tokenize_all(b"<< >>");
        assert_eq!(tokens[0].name_val().unwrap().as_bytes(), b"<<");
        assert_eq!(tokens[1].name_val().unwrap().as_bytes(), b">>");
        assert!(tokens[0].is_executable());
    }

    #[test]
    fn self_delimiting_names_need_no_whitespace() {
        let (_, tokens) = tokenize_all(b"1[2]3");
        let kinds: Vec<_> = tokens.iter().map(|t| t.type_name()).collect();
        assert_eq!(
            kinds,
            vec![
                &b"integertype"[..],
                b"nametype",
                b"integertype",
                b"nametype",
                b"integertype"
            ]
        );
    }

    #[test]
    fn binary_integer_tokens() {
        let (_, tokens) = tokenize_all(&[132, 0, 0, 1, 0, b' ', 136, 0xfe]);
        assert_eq!(tokens[0].value, Value::Int(256));
        assert_eq!(tokens[1].value, Value::Int(-2));
    }

    #[test]
    fn binary_real_and_bool_tokens() {
        let mut input = vec![138];
        input.extend_from_slice(&1.5f32.to_be_bytes());
        input.push(141);
        input.push(1);
        let (_, tokens) = tokenize_all(&input);
        assert_eq!(tokens[0].value, Value::Real(1.5));
        assert_eq!(tokens[1].value, Value::Bool(true));
    }

    #[test]
    fn binary_string_token() {
        let (ctx, tokens) = tokenize_all(&[142, 3, b'a', b'b', b'c']);
        let slice = tokens[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"abc");
    }

    #[test]
    fn token_from_string_shrinks_the_slice() {
        let mut ctx = Context::new(true);
        let slice = match ctx.alloc_string_obj(b"12 34".to_vec()).value {
            Value::String(s) => s,
            _ => unreachable!(),
        };

        let (token, rest) = token_from_string(&mut ctx, slice).unwrap().unwrap();
        assert_eq!(token.value, Value::Int(12));
        assert!(rest.len < slice.len);

        let (token, rest) = token_from_string(&mut ctx, rest).unwrap().unwrap();
        assert_eq!(token.value, Value::Int(34));

        assert!(token_from_string(&mut ctx, rest).unwrap().is_none());
    }
}
