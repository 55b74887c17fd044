use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use yap::{one_of, types::WithContext, IntoTokens, TokenLocation, Tokens};

use crate::{
    AccessKind, AddressSource, Allocation, Design, LValue, Location, LocationConstant, LogicalValue, Memory,
    MemoryStyle, Pointer,
};

// Allocation numbers may be referenced before their declaration (a pointer can
// target a later memory), so location specs are recorded as written and resolved
// once the whole design has been read.
#[derive(Debug, Clone, Copy)]
enum LocSpec {
    Root { alloc: usize },
    Offset { alloc: usize, delta: u32, size: u32 },
    Index { alloc: usize, size: u32 },
}

#[derive(Debug, Clone, Copy)]
enum SourceSpec {
    Pointer(usize),
    Constant(usize),
}

#[derive(Debug)]
struct Context {
    design: Design,
    alloc_map: BTreeMap<usize, Allocation>,
    ptr_map: BTreeMap<usize, Pointer>,
    const_map: BTreeMap<usize, LocationConstant>,
    lvalue_map: BTreeMap<usize, LValue>,
    pending_targets: Vec<(AddressSource, LocSpec)>,
    pending_accesses: Vec<(Memory, LValue, Vec<LocSpec>)>,
    pending_sources: Vec<(LValue, SourceSpec)>,
}

impl Context {
    fn new() -> Context {
        Context {
            design: Design::new(),
            alloc_map: BTreeMap::new(),
            ptr_map: BTreeMap::new(),
            const_map: BTreeMap::new(),
            lvalue_map: BTreeMap::new(),
            pending_targets: Vec::new(),
            pending_accesses: Vec::new(),
            pending_sources: Vec::new(),
        }
    }

    fn add_alloc(&mut self, index: usize, allocation: Allocation) {
        assert_eq!(self.alloc_map.insert(index, allocation), None, "allocation indices cannot be reused");
    }

    fn add_pointer(&mut self, index: usize, pointer: Pointer) {
        assert_eq!(self.ptr_map.insert(index, pointer), None, "pointer indices cannot be reused");
    }

    fn add_constant(&mut self, index: usize, constant: LocationConstant) {
        assert_eq!(self.const_map.insert(index, constant), None, "constant indices cannot be reused");
    }

    fn add_lvalue(&mut self, index: usize, lvalue: LValue) {
        assert_eq!(self.lvalue_map.insert(index, lvalue), None, "access indices cannot be reused");
    }

    fn get_lvalue(&self, index: usize) -> LValue {
        *self.lvalue_map.get(&index).expect("index should reference an access")
    }

    fn lookup_alloc(&self, index: usize) -> Allocation {
        match self.alloc_map.get(&index) {
            Some(&allocation) => allocation,
            None => panic!("unresolved allocation &{}", index),
        }
    }

    fn resolve(&mut self, spec: LocSpec) -> Location {
        match spec {
            LocSpec::Root { alloc } => self.design.root_location(self.lookup_alloc(alloc)),
            LocSpec::Offset { alloc, delta, size } => {
                let root = self.design.root_location(self.lookup_alloc(alloc));
                self.design.add_offset(root, delta, size)
            }
            LocSpec::Index { alloc, size } => {
                let root = self.design.root_location(self.lookup_alloc(alloc));
                self.design.add_index(root, size)
            }
        }
    }

    fn apply(mut self) -> Design {
        for (memory, lvalue, specs) in std::mem::take(&mut self.pending_accesses) {
            // an access with no locations still has to exist in the access map
            self.design.replace_access_locations(memory, lvalue, Default::default());
            for spec in specs {
                let location = self.resolve(spec);
                self.design.add_access(memory, lvalue, location);
            }
        }
        for (source, spec) in std::mem::take(&mut self.pending_targets) {
            let location = self.resolve(spec);
            source.set_target(&mut self.design, location);
        }
        for (lvalue, spec) in std::mem::take(&mut self.pending_sources) {
            let source = match spec {
                SourceSpec::Pointer(index) => match self.ptr_map.get(&index) {
                    Some(&pointer) => AddressSource::Pointer(pointer),
                    None => panic!("unresolved pointer ${}", index),
                },
                SourceSpec::Constant(index) => match self.const_map.get(&index) {
                    Some(&constant) => AddressSource::Constant(constant),
                    None => panic!("unresolved constant !{}", index),
                },
            };
            self.design.add_lvalue_source(lvalue, source);
        }
        self.design
    }
}

fn parse_space(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    t.skip_while(|c| *c == ' ' || *c == '\t') > 0
}

fn parse_comment(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    if !t.token(';') {
        return false;
    }
    t.skip_while(|c| *c != '\n');
    true
}

fn parse_blank(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    let space = parse_space(t);
    let comment = parse_comment(t);
    space || comment
}

#[must_use]
fn parse_symbol(t: &mut WithContext<impl Tokens<Item = char>, Context>, symbol: char) -> Option<()> {
    if !t.token(symbol) {
        return None;
    }
    Some(())
}

fn parse_decimal<T: FromStr>(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<T> {
    t.take_while(|c| c.is_ascii_digit()).parse::<T, String>().ok()
}

fn parse_hex_byte(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<u8> {
    if let (Some(hi @ ('0'..='9' | 'a'..='f')), Some(lo @ ('0'..='9' | 'a'..='f'))) = (t.next(), t.next()) {
        u8::from_str_radix(&format!("{hi}{lo}"), 16).ok()
    } else {
        None
    }
}

fn parse_string_char(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<u8> {
    match t.next() {
        Some('"' | '\\') => None,
        Some(char) if char.is_ascii() => Some(char as u8),
        _ => None,
    }
}

fn parse_string_escape(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<u8> {
    parse_symbol(t, '\\')?;
    match t.next() {
        Some(char @ ('"' | '\\')) => Some(char as u8),
        Some(hi @ ('0'..='9' | 'a'..='f')) => {
            if let Some(lo @ ('0'..='9' | 'a'..='f')) = t.next() {
                u8::from_str_radix(&format!("{hi}{lo}"), 16).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_string(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<String> {
    parse_symbol(t, '"')?;
    let bytes = t
        .many(|t| {
            one_of!(t;
                parse_string_char(t),
                parse_string_escape(t)
            )
        })
        .collect::<Vec<u8>>();
    parse_symbol(t, '"')?;
    String::from_utf8(bytes).ok()
}

fn parse_keyword(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<String> {
    let name: String = t.take_while(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    if name.is_empty() {
        return None;
    }
    Some(name)
}

#[must_use]
fn parse_keyword_expect(t: &mut WithContext<impl Tokens<Item = char>, Context>, expected: &str) -> Option<()> {
    let keyword = parse_keyword(t)?;
    if keyword != expected {
        return None;
    }
    Some(())
}

fn parse_access_index(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<usize> {
    parse_symbol(t, '#')?;
    parse_decimal(t)
}

fn parse_arrow(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<()> {
    parse_symbol(t, '-')?;
    parse_symbol(t, '>')
}

fn parse_locspec(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<LocSpec> {
    fn parse_offset(t: &mut WithContext<impl Tokens<Item = char>, Context>, alloc: usize) -> Option<LocSpec> {
        parse_symbol(t, '+')?;
        let delta = parse_decimal(t)?;
        parse_symbol(t, ':')?;
        let size = parse_decimal(t)?;
        Some(LocSpec::Offset { alloc, delta, size })
    }

    fn parse_index(t: &mut WithContext<impl Tokens<Item = char>, Context>, alloc: usize) -> Option<LocSpec> {
        parse_symbol(t, '*')?;
        parse_symbol(t, ':')?;
        let size = parse_decimal(t)?;
        Some(LocSpec::Index { alloc, size })
    }

    parse_symbol(t, '&')?;
    let alloc: usize = parse_decimal(t)?;
    one_of!(t;
        parse_offset(t, alloc),
        parse_index(t, alloc),
        Some(LocSpec::Root { alloc })
    )
}

fn parse_value(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<LogicalValue> {
    fn parse_scalar(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<LogicalValue> {
        parse_keyword_expect(t, "bytes")?;
        let bytes = t
            .many(|t| {
                parse_space(t);
                parse_hex_byte(t)
            })
            .collect::<Vec<u8>>();
        Some(LogicalValue::Scalar(bytes))
    }

    fn parse_pointer(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<LogicalValue> {
        parse_keyword_expect(t, "ptr")?;
        parse_blank(t);
        parse_symbol(t, '$')?;
        let index: usize = parse_decimal(t)?;
        parse_symbol(t, ':')?;
        let size: u32 = parse_decimal(t)?;
        parse_blank(t);
        parse_arrow(t)?;
        parse_blank(t);
        let spec = parse_locspec(t)?;
        let ctx = t.context_mut();
        let pointer = ctx.design.add_pointer(Location::INVALID);
        ctx.add_pointer(index, pointer);
        ctx.pending_targets.push((AddressSource::Pointer(pointer), spec));
        Some(LogicalValue::Pointer { pointer, size })
    }

    fn parse_record(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<LogicalValue> {
        parse_symbol(t, '{')?;
        let parts = Vec::from_iter(
            t.many(|t| {
                parse_blank(t);
                parse_value(t)
            })
            .as_iter(),
        );
        parse_blank(t);
        parse_symbol(t, '}')?;
        Some(LogicalValue::Record(parts))
    }

    one_of!(t;
        parse_scalar(t),
        parse_pointer(t),
        parse_record(t)
    )
}

fn parse_source_ref(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<SourceSpec> {
    fn parse_pointer_ref(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<SourceSpec> {
        parse_symbol(t, '$')?;
        Some(SourceSpec::Pointer(parse_decimal(t)?))
    }

    fn parse_constant_ref(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<SourceSpec> {
        parse_symbol(t, '!')?;
        Some(SourceSpec::Constant(parse_decimal(t)?))
    }

    one_of!(t;
        parse_pointer_ref(t),
        parse_constant_ref(t)
    )
}

fn parse_memory(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<()> {
    fn parse_alloc(t: &mut WithContext<impl Tokens<Item = char>, Context>, memory: Memory) -> Option<()> {
        parse_keyword_expect(t, "alloc")?;
        parse_blank(t);
        parse_symbol(t, '&')?;
        let index: usize = parse_decimal(t)?;
        parse_blank(t);
        let ident = parse_string(t)?;
        parse_blank(t);
        let value = parse_value(t)?;
        let ctx = t.context_mut();
        let allocation = ctx.design.add_allocation(memory, &ident, value);
        ctx.add_alloc(index, allocation);
        Some(())
    }

    fn parse_const_decl(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<()> {
        parse_keyword_expect(t, "const")?;
        parse_blank(t);
        parse_symbol(t, '!')?;
        let index: usize = parse_decimal(t)?;
        parse_blank(t);
        parse_arrow(t)?;
        parse_blank(t);
        let spec = parse_locspec(t)?;
        let ctx = t.context_mut();
        let constant = ctx.design.add_constant(Location::INVALID);
        ctx.add_constant(index, constant);
        ctx.pending_targets.push((AddressSource::Constant(constant), spec));
        Some(())
    }

    fn parse_access(t: &mut WithContext<impl Tokens<Item = char>, Context>, memory: Memory) -> Option<()> {
        let kind = one_of!(t;
            parse_keyword_expect(t, "read").map(|()| AccessKind::Read),
            parse_keyword_expect(t, "write").map(|()| AccessKind::Write)
        )?;
        parse_blank(t);
        let index = parse_access_index(t)?;
        parse_blank(t);
        let name = parse_string(t)?;
        parse_blank(t);
        parse_symbol(t, '[')?;
        let specs = Vec::from_iter(
            t.many(|t| {
                parse_blank(t);
                parse_locspec(t)
            })
            .as_iter(),
        );
        parse_blank(t);
        parse_symbol(t, ']')?;
        let sources = t
            .optional(|t| {
                parse_blank(t);
                parse_keyword_expect(t, "via")?;
                parse_blank(t);
                parse_symbol(t, '[')?;
                let sources = Vec::from_iter(
                    t.many(|t| {
                        parse_blank(t);
                        parse_source_ref(t)
                    })
                    .as_iter(),
                );
                parse_blank(t);
                parse_symbol(t, ']')?;
                Some(sources)
            })
            .unwrap_or_default();
        let ctx = t.context_mut();
        let lvalue = ctx.design.add_lvalue(&name, kind, memory);
        ctx.add_lvalue(index, lvalue);
        ctx.pending_accesses.push((memory, lvalue, specs));
        for source in sources {
            ctx.pending_sources.push((lvalue, source));
        }
        Some(())
    }

    fn parse_port(t: &mut WithContext<impl Tokens<Item = char>, Context>, memory: Memory) -> Option<()> {
        parse_keyword_expect(t, "port")?;
        parse_blank(t);
        let index: usize = parse_decimal(t)?;
        parse_blank(t);
        let read_only = t.optional(|t| parse_keyword_expect(t, "ro")).is_some();
        parse_blank(t);
        parse_symbol(t, '{')?;
        let indices = Vec::from_iter(
            t.many(|t| {
                parse_blank(t);
                parse_access_index(t)
            })
            .as_iter(),
        );
        parse_blank(t);
        parse_symbol(t, '}')?;
        let ctx = t.context_mut();
        assert_eq!(index, ctx.design.ports_of(memory).len(), "port indices must be declared in order");
        let port = ctx.design.add_port(memory, read_only);
        for index in indices {
            let lvalue = ctx.get_lvalue(index);
            ctx.design.attach_access(port, lvalue);
        }
        Some(())
    }

    parse_keyword_expect(t, "memory")?;
    parse_blank(t);
    parse_symbol(t, '%')?;
    let index: usize = parse_decimal(t)?;
    parse_blank(t);
    let lut = t.optional(|t| parse_keyword_expect(t, "lut")).is_some();
    parse_blank(t);
    let fixed = t.optional(|t| parse_keyword_expect(t, "fixed")).is_some();
    parse_blank(t);
    parse_symbol(t, '{')?;
    parse_blank(t);
    parse_symbol(t, '\n')?;
    let ctx = t.context_mut();
    let memory = ctx.design.add_memory(if lut { MemoryStyle::Lut } else { MemoryStyle::Ram });
    assert_eq!(index, memory.index(), "memory indices must be declared in order");
    if fixed {
        ctx.design.set_implemented(memory);
    }
    while let Some(()) = t.optional(|t| {
        parse_blank(t);
        one_of!(t;
            parse_alloc(t, memory),
            parse_const_decl(t),
            parse_access(t, memory),
            parse_port(t, memory)
        )?;
        parse_blank(t);
        parse_symbol(t, '\n')?;
        Some(())
    }) {}
    parse_blank(t);
    parse_symbol(t, '}')?;
    parse_blank(t);
    parse_symbol(t, '\n')?;
    Some(())
}

fn parse_task(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<()> {
    parse_keyword_expect(t, "task")?;
    parse_blank(t);
    let name = parse_string(t)?;
    parse_blank(t);
    parse_symbol(t, '{')?;
    let indices = Vec::from_iter(
        t.many(|t| {
            parse_blank(t);
            parse_access_index(t)
        })
        .as_iter(),
    );
    parse_blank(t);
    parse_symbol(t, '}')?;
    parse_blank(t);
    parse_symbol(t, '\n')?;
    let ctx = t.context_mut();
    let task = ctx.design.add_task(&name);
    for index in indices {
        let lvalue = ctx.get_lvalue(index);
        ctx.design.push_task_access(task, lvalue);
    }
    Some(())
}

fn parse_line(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    parse_blank(t);
    one_of!(t;
        parse_memory(t).is_some(),
        parse_task(t).is_some(),
        t.token('\n')
    )
}

#[derive(Debug)]
pub struct ParseError {
    source: String,
    offset: usize,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse near offset {}: {:?}", self.offset, &self.source[self.offset..])
    }
}

impl std::error::Error for ParseError {}

pub fn parse(source: &str) -> Result<Design, ParseError> {
    let context = Context::new();
    let mut tokens = source.into_tokens().with_context(context);
    while parse_line(&mut tokens) {}
    parse_blank(&mut tokens);
    let (mut tokens, context) = tokens.into_parts();
    if !tokens.eof() {
        return Err(ParseError { source: String::from(source), offset: tokens.location().offset() });
    }
    Ok(context.apply())
}

impl FromStr for Design {
    type Err = crate::ParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        crate::parse(source)
    }
}
