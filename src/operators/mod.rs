//! The built-in operator registry. Every operator is a named callable with
//! one shared contract: validate operands with non-destructive peeks, then
//! act; on failure the operand stack is exactly as the caller left it.

use once_cell::sync::Lazy;

use crate::{
    context::Context,
    object::{Access, DictKey, Object, Operator, Value},
};

pub mod arith;
pub mod array;
pub mod control;
pub mod deviceops;
pub mod dict;
pub mod errorops;
pub mod fileops;
pub mod font;
pub mod gstate;
pub mod matrixops;
pub mod misc;
pub mod paint;
pub mod pathops;
pub mod relational;
pub mod resource;
pub mod stackops;
pub mod string;
pub mod typeops;
pub mod vmops;

macro_rules! operators {
    ($table:ident, $($name:literal => $func:path),* $(,)?) => {
        $( $table.push(crate::object::Operator { name: $name, func: $func }); )*
    };
}
pub(crate) use operators;

static REGISTRY: Lazy<Vec<Operator>> = Lazy::new(|| {
    let mut table = Vec::with_capacity(400);
    stackops::register(&mut table);
    arith::register(&mut table);
    relational::register(&mut table);
    array::register(&mut table);
    dict::register(&mut table);
    string::register(&mut table);
    control::register(&mut table);
    typeops::register(&mut table);
    vmops::register(&mut table);
    fileops::register(&mut table);
    misc::register(&mut table);
    matrixops::register(&mut table);
    gstate::register(&mut table);
    pathops::register(&mut table);
    paint::register(&mut table);
    font::register(&mut table);
    resource::register(&mut table);
    deviceops::register(&mut table);
    errorops::register(&mut table);
    table
});

/// Adapted Adobe StandardEncoding: code point to glyph name, .notdef gaps.
#[rustfmt::skip]
static STANDARD_ENCODING: &[Option<&str>] = &[
    /*\00x*/ None, None, None, None, None, None, None, None,
    /*\01x*/ None, None, None, None, None, None, None, None,
    /*\02x*/ None, None, None, None, None, None, None, None,
    /*\03x*/ None, None, None, None, None, None, None, None,
    /*\04x*/ Some("space"), Some("exclam"), Some("quotedbl"), Some("numbersign"),
             Some("dollar"), Some("percent"), Some("ampersand"), Some("quoteright"),
    /*\05x*/ Some("parenleft"), Some("parenright"), Some("asterisk"), Some("plus"),
             Some("comma"), Some("hyphen"), Some("period"), Some("slash"),
    /*\06x*/ Some("zero"), Some("one"), Some("two"), Some("three"),
             Some("four"), Some("five"), Some("six"), Some("seven"),
    /*\07x*/ Some("eight"), Some("nine"), Some("colon"), Some("semicolon"),
             Some("less"), Some("equal"), Some("greater"), Some("question"),
    /*\10x*/ Some("at"), Some("A"), Some("B"), Some("C"),
             Some("D"), Some("E"), Some("F"), Some("G"),
    /*\11x*/ Some("H"), Some("I"), Some("J"), Some("K"),
             Some("L"), Some("M"), Some("N"), Some("O"),
    /*\12x*/ Some("P"), Some("Q"), Some("R"), Some("S"),
             Some("T"), Some("U"), Some("V"), Some("W"),
    /*\13x*/ Some("X"), Some("Y"), Some("Z"), Some("bracketleft"),
             Some("backslash"), Some("bracketright"), Some("asciicircum"), Some("underscore"),
    /*\14x*/ Some("quoteleft"), Some("a"), Some("b"), Some("c"),
             Some("d"), Some("e"), Some("f"), Some("g"),
    /*\15x*/ Some("h"), Some("i"), Some("j"), Some("k"),
             Some("l"), Some("m"), Some("n"), Some("o"),
    /*\16x*/ Some("p"), Some("q"), Some("r"), Some("s"),
             Some("t"), Some("u"), Some("v"), Some("w"),
    /*\17x*/ Some("x"), Some("y"), Some("z"), Some("braceleft"),
             Some("bar"), Some("braceright"), Some("asciitilde"), None,
    /*\20x*/ None, None, None, None, None, None, None, None,
    /*\21x*/ None, None, None, None, None, None, None, None,
    /*\22x*/ None, None, None, None, None, None, None, None,
    /*\23x*/ None, None, None, None, None, None, None, None,
    /*\24x*/ None, Some("exclamdown"), Some("cent"), Some("sterling"),
             Some("fraction"), Some("yen"), Some("florin"), Some("section"),
    /*\25x*/ Some("currency"), Some("quotesingle"), Some("quotedblleft"), Some("guillemotleft"),
             Some("guilsinglleft"), Some("guilsinglright"), Some("fi"), Some("fl"),
    /*\26x*/ None, Some("endash"), Some("dagger"), Some("daggerdbl"),
             Some("periodcentered"), None, Some("paragraph"), Some("bullet"),
    /*\27x*/ Some("quotesinglbase"), Some("quotedblbase"), Some("quotedblright"), Some("guillemotright"),
             Some("ellipsis"), Some("perthousand"), None, Some("questiondown"),
    /*\30x*/ None, Some("grave"), Some("acute"), Some("circumflex"),
             Some("tilde"), Some("macron"), Some("breve"), Some("dotaccent"),
    /*\31x*/ Some("dieresis"), None, Some("ring"), Some("cedilla"),
             None, Some("hungarumlaut"), Some("ogonek"), Some("caron"),
    /*\32x*/ Some("emdash"), None, None, None, None, None, None, None,
    /*\33x*/ None, None, None, None, None, None, None, None,
    /*\34x*/ None, Some("AE"), None, Some("ordfeminine"), None, None, None, None,
    /*\35x*/ Some("Lslash"), Some("Oslash"), Some("OE"), Some("ordmasculine"), None, None, None, None,
    /*\36x*/ None, Some("ae"), None, None, None, Some("dotlessi"), None, None,
    /*\37x*/ Some("lslash"), Some("oslash"), Some("oe"), Some("germandbls"), None, None, None, None,
];

/// Seeds systemdict, errordict, serverdict and the resource categories, then
/// seals systemdict read-only.
pub fn install(ctx: &mut Context) {
    let system = ctx.system_dict;

    for op in REGISTRY.iter() {
        ctx.define_in(system, op.name.as_bytes(), Object::operator(*op));
    }

    // well-known dictionaries are reachable by name
    for (name, handle) in [
        (&b"systemdict"[..], ctx.system_dict),
        (b"globaldict", ctx.global_dict),
        (b"userdict", ctx.user_dict),
        (b"errordict", ctx.error_dict),
        (b"$error", ctx.dollar_error),
        (b"statusdict", ctx.status_dict),
        (b"serverdict", ctx.server_dict),
        (b"FontDirectory", ctx.font_directory),
    ] {
        ctx.define_in(system, name, Object::new(Value::Dict(handle)));
    }

    let encoding: Vec<Object> = STANDARD_ENCODING
        .iter()
        .map(|name| match name {
            Some(glyph) => Object::literal_name(glyph.as_bytes()),
            None => Object::literal_name(b".notdef"),
        })
        .collect();
    let encoding_obj = {
        let mut obj = ctx.alloc_array_obj(encoding);
        obj.access = Access::ReadOnly;
        obj
    };
    ctx.define_in(system, b"StandardEncoding", encoding_obj.clone());
    let encoding_category = resource::seed_categories(ctx);
    ctx.define_in(encoding_category, b"StandardEncoding", encoding_obj);

    errorops::seed_errordict(ctx);

    // serverdict carries the Level 1 job-control entry point
    let exitserver = ctx
        .vm()
        .dict(system)
        .get(&DictKey::name(b"exitserver"))
        .cloned()
        .expect("registered above");
    let server = ctx.server_dict;
    ctx.define_in(server, b"exitserver", exitserver);

    ctx.vm_mut().dict_mut(system).access = Access::ReadOnly;
}
