//! Named resources: category dictionaries under a central registry, with the
//! Font category aliasing FontDirectory.

use crate::{
    context::Context,
    engine::{self, LoopFrame},
    error::{ErrorKind, PsResult},
    object::{DictHandle, DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "defineresource" => defineresource,
        "undefineresource" => undefineresource,
        "findresource" => findresource,
        "resourcestatus" => resourcestatus,
        "resourceforall" => resourceforall,
        "findcolorrendering" => findcolorrendering,
    );
}

const CATEGORIES: &[&[u8]] = &[
    b"Font",
    b"Encoding",
    b"Pattern",
    b"ColorSpace",
    b"Form",
    b"Halftone",
    b"ProcSet",
    b"CMap",
    b"CIDFont",
    b"ColorRendering",
    b"Generic",
];

/// Creates the category dictionaries. Returns the Encoding category so the
/// installer can seed StandardEncoding into it.
pub(super) fn seed_categories(ctx: &mut Context) -> DictHandle {
    let registry = ctx.resource_categories;
    let mut encoding = None;

    for &category in CATEGORIES {
        let handle = if category == b"Font" {
            ctx.font_directory
        } else {
            ctx.vm_mut().alloc_local_dict(16)
        };
        ctx.define_in(registry, category, Object::new(Value::Dict(handle)));
        if category == b"Encoding" {
            encoding = Some(handle);
        }
    }

    encoding.expect("Encoding is in CATEGORIES")
}

fn category_dict(ctx: &Context, category: &Object) -> PsResult<DictHandle> {
    let key = match &category.value {
        Value::Name(name) => DictKey::Name(name.clone()),
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    match ctx.vm().dict(ctx.resource_categories).get(&key) {
        Some(obj) => obj.dict_val(),
        None => anyhow::bail!(ErrorKind::UndefinedResource),
    }
}

/// key instance category `defineresource` instance
fn defineresource(ctx: &mut Context) -> PsResult<()> {
    let handle = category_dict(ctx, ctx.peek(0)?)?;
    let instance = ctx.peek(1)?.clone();
    let key = DictKey::from_object(ctx, ctx.peek(2)?)?;
    ctx.npop(3);

    ctx.vm_mut().dict_mut(handle).insert(key, instance.clone());
    ctx.push(instance)
}

fn undefineresource(ctx: &mut Context) -> PsResult<()> {
    let handle = category_dict(ctx, ctx.peek(0)?)?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
    ctx.npop(2);
    ctx.vm_mut().dict_mut(handle).remove(&key);
    Ok(())
}

/// key category `findresource` instance
fn findresource(ctx: &mut Context) -> PsResult<()> {
    let handle = category_dict(ctx, ctx.peek(0)?)?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;

    if let Some(instance) = ctx.vm().dict(handle).get(&key).cloned() {
        ctx.npop(2);
        return ctx.push(instance);
    }

    // Font lookups fall through to findfont's substitution path
    if handle == ctx.font_directory {
        ctx.npop(1);
        return super::font::findfont(ctx);
    }

    anyhow::bail!(ErrorKind::UndefinedResource);
}

/// key category `resourcestatus` status size true | false
fn resourcestatus(ctx: &mut Context) -> PsResult<()> {
    let handle = category_dict(ctx, ctx.peek(0)?)?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
    ctx.npop(2);

    if ctx.vm().dict(handle).contains(&key) {
        // status 2: defined in VM; size is not meaningful here
        ctx.push(Object::int(2))?;
        ctx.push(Object::int(0))?;
        ctx.push(Object::bool(true))
    } else {
        ctx.push(Object::bool(false))
    }
}

/// template proc scratch category `resourceforall` -
fn resourceforall(ctx: &mut Context) -> PsResult<()> {
    let handle = category_dict(ctx, ctx.peek(0)?)?;
    let scratch = ctx.peek_string(1)?;
    ctx.check_writable(ctx.peek(1)?)?;
    let body = ctx.peek_proc(2)?;
    let template_slice = ctx.peek_string(3)?;
    let template = ctx.vm().string_bytes(template_slice).to_vec();
    ctx.npop(4);

    let mut names: Vec<Vec<u8>> = ctx
        .vm()
        .dict(handle)
        .iter_ordered()
        .filter_map(|(key, _)| match key {
            DictKey::Name(name) => Some(name.as_bytes().to_vec()),
            _ => None,
        })
        .filter(|name| super::fileops::template_matches(&template, name))
        .collect();
    names.sort();

    engine::push_loop(ctx, LoopFrame::FilenameForall { names, pos: 0, scratch, body })
}

/// intent `findcolorrendering` name bool
fn findcolorrendering(ctx: &mut Context) -> PsResult<()> {
    let intent = ctx.peek_name(0)?;
    ctx.npop(1);

    let rendering = ctx
        .vm()
        .dict(ctx.resource_categories)
        .get(&DictKey::name(b"ColorRendering"))
        .and_then(|obj| obj.dict_val().ok());

    let found = rendering
        .map(|handle| ctx.vm().dict(handle).contains(&DictKey::Name(intent.clone())))
        .unwrap_or(false);

    if found {
        ctx.push(Object::new(Value::Name(intent)))?;
        ctx.push(Object::bool(true))
    } else {
        ctx.push(Object::literal_name(b"DefaultColorRendering"))?;
        ctx.push(Object::bool(false))
    }
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    #[test]
    fn define_and_find_round_trip() {
        let ctx = run(b"/pat1 << /a 1 >> /Pattern defineresource pop /pat1 /Pattern findresource /a get");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(1));
    }

    #[test]
    fn missing_resource_raises() {
        let ctx = run(b"{ /nope /Pattern findresource } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"undefinedresource");
    }

    #[test]
    fn unknown_category_raises() {
        let ctx = run(b"{ /x /NoSuchCategory findresource } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn resourcestatus_reports_membership() {
        let ctx = run(b"/StandardEncoding /Encoding resourcestatus");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let ctx = run(b"/Missing /Encoding resourcestatus");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
    }

    #[test]
    fn font_category_aliases_fontdirectory() {
        let ctx = run(
            b"/F << /FontType 3 /FontMatrix [0.001 0 0 0.001 0 0] >> definefont pop \
              /F /Font resourcestatus",
        );
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn resourceforall_enumerates_matching_names() {
        let ctx = run(
            b"0 (Standard*) { pop 1 add } 32 string /Encoding resourceforall",
        );
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(1));
    }

    #[test]
    fn findcolorrendering_falls_back() {
        let ctx = run(b"/Perceptual findcolorrendering");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        let name = ctx.op_stack[ctx.op_stack.len() - 2].name_val().unwrap();
        assert_eq!(name.as_bytes(), b"DefaultColorRendering");
    }
}
