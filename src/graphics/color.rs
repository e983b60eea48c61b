use log::warn;

use crate::{
    context::Context,
    engine,
    error::{ErrorKind, PsResult},
    object::{DictHandle, DictKey, Name, Object, Value},
};

use super::display_list::Rgb;

/// CIE-based space parameters. Decode procedures are PostScript procedures
/// run through the interpreter at conversion time; an empty vector means
/// identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CieSpace {
    pub components: usize,
    pub decode_input: Vec<Object>,
    pub matrix_input: [f32; 9],
    pub decode_lmn: Vec<Object>,
    pub matrix_lmn: [f32; 9],
    pub white_point: [f32; 3],
}

impl CieSpace {
    pub fn with_components(components: usize) -> Self {
        Self {
            components,
            decode_input: Vec::new(),
            matrix_input: IDENTITY_3X3,
            decode_lmn: Vec::new(),
            matrix_lmn: IDENTITY_3X3,
            white_point: [0.9505, 1.0, 1.089],
        }
    }
}

pub const IDENTITY_3X3: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    CieBasedA(Box<CieSpace>),
    CieBasedAbc(Box<CieSpace>),
    CieBasedDef(Box<CieSpace>),
    CieBasedDefg(Box<CieSpace>),

    /// ICC profile transforms are an external collaborator; the declared
    /// alternate space carries the conversion.
    IccBased {
        components: usize,
        alternate: Box<ColorSpace>,
    },

    Indexed {
        base: Box<ColorSpace>,
        hival: i32,
        lookup: Vec<u8>,
    },

    Separation {
        name: Name,
        alternate: Box<ColorSpace>,
        tint_transform: Object,
    },

    DeviceN {
        names: Vec<Name>,
        alternate: Box<ColorSpace>,
        tint_transform: Object,
    },

    /// Colored patterns carry their own color; uncolored patterns are stencils
    /// painted with the base space's current color.
    Pattern { base: Option<Box<ColorSpace>> },
}

impl ColorSpace {
    pub fn name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRgb => "DeviceRGB",
            ColorSpace::DeviceCmyk => "DeviceCMYK",
            ColorSpace::CieBasedA(_) => "CIEBasedA",
            ColorSpace::CieBasedAbc(_) => "CIEBasedABC",
            ColorSpace::CieBasedDef(_) => "CIEBasedDEF",
            ColorSpace::CieBasedDefg(_) => "CIEBasedDEFG",
            ColorSpace::IccBased { .. } => "ICCBased",
            ColorSpace::Indexed { .. } => "Indexed",
            ColorSpace::Separation { .. } => "Separation",
            ColorSpace::DeviceN { .. } => "DeviceN",
            ColorSpace::Pattern { .. } => "Pattern",
        }
    }

    /// Number of components `setcolor` expects for this space.
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CieBasedA(_) => 1,
            ColorSpace::DeviceRgb
            | ColorSpace::CieBasedAbc(_)
            | ColorSpace::CieBasedDef(_) => 3,
            ColorSpace::DeviceCmyk | ColorSpace::CieBasedDefg(_) => 4,
            ColorSpace::IccBased { components, .. } => *components,
            ColorSpace::Indexed { .. } => 1,
            ColorSpace::Separation { .. } => 1,
            ColorSpace::DeviceN { names, .. } => names.len(),
            ColorSpace::Pattern { base } => {
                base.as_ref().map_or(0, |base| base.components())
            }
        }
    }

    /// The initial color installed by `setcolorspace`: black for device and
    /// CIE spaces, index 0 for Indexed, tint 1.0 for Separation/DeviceN.
    pub fn initial_components(&self) -> Vec<f32> {
        match self {
            ColorSpace::DeviceCmyk => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::Separation { .. } => vec![1.0],
            ColorSpace::DeviceN { names, .. } => vec![1.0; names.len()],
            space => vec![0.0; space.components()],
        }
    }
}

/// The current color: the space it is expressed in plus the raw components as
/// given to `setcolor`. Conversion to device RGB is deferred until a painting
/// operator needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Color {
    pub space: ColorSpace,
    pub components: Vec<f32>,
    pub pattern: Option<DictHandle>,

    /// The operand given to `setcolorspace`, reported back verbatim by
    /// `currentcolorspace`.
    pub source: Option<Object>,
}

impl Color {
    pub fn black() -> Self {
        Self {
            space: ColorSpace::DeviceGray,
            components: vec![0.0],
            pattern: None,
            source: None,
        }
    }

    pub fn device_rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            space: ColorSpace::DeviceRgb,
            components: vec![r, g, b],
            pattern: None,
            source: None,
        }
    }
}

pub fn gray_to_rgb(g: f32) -> Rgb {
    Rgb::new(g, g, g)
}

/// NTSC luminance weighting, the PLRM formula for currentgray.
pub fn rgb_to_gray(rgb: Rgb) -> f32 {
    0.3 * rgb.r + 0.59 * rgb.g + 0.11 * rgb.b
}

pub fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> Rgb {
    Rgb::new(
        1.0 - (c + k).min(1.0),
        1.0 - (m + k).min(1.0),
        1.0 - (y + k).min(1.0),
    )
}

/// Undercolor-removal form of the PLRM RGB→CMYK conversion with full black
/// generation.
pub fn rgb_to_cmyk(rgb: Rgb) -> (f32, f32, f32, f32) {
    let c = 1.0 - rgb.r;
    let m = 1.0 - rgb.g;
    let y = 1.0 - rgb.b;
    let k = c.min(m).min(y);
    (c - k, m - k, y - k, k)
}

fn mat3_apply(m: &[f32; 9], v: [f32; 3]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// XYZ (D65) to sRGB with display gamma.
fn xyz_to_srgb(xyz: [f32; 3]) -> Rgb {
    let linear = mat3_apply(
        &[
            3.2406, -1.5372, -0.4986, //
            -0.9689, 1.8758, 0.0415, //
            0.0557, -0.2040, 1.0570,
        ],
        xyz,
    );

    let gamma = |v: f32| v.clamp(0.0, 1.0).powf(1.0 / 2.2);
    Rgb::new(gamma(linear[0]), gamma(linear[1]), gamma(linear[2]))
}

/// Runs one single-argument decode procedure through the interpreter.
fn run_decode_proc(ctx: &mut Context, proc: &Object, input: f32) -> PsResult<f32> {
    ctx.push(Object::real(input))?;
    engine::call_procedure(ctx, proc.clone())?;
    ctx.pop()?.num_val()
}

fn cie_to_rgb(ctx: &mut Context, cie: &CieSpace, components: &[f32]) -> PsResult<Rgb> {
    let mut decoded = [0.0f32; 3];
    for i in 0..3 {
        let raw = components.get(i).copied().unwrap_or(0.0);
        decoded[i] = match cie.decode_input.get(i) {
            Some(proc) if proc.is_procedure() => run_decode_proc(ctx, proc, raw)?,
            _ => raw,
        };
    }

    let mut lmn = mat3_apply(&cie.matrix_input, decoded);
    for i in 0..3 {
        if let Some(proc) = cie.decode_lmn.get(i) {
            if proc.is_procedure() {
                lmn[i] = run_decode_proc(ctx, proc, lmn[i])?;
            }
        }
    }

    Ok(xyz_to_srgb(mat3_apply(&cie.matrix_lmn, lmn)))
}

/// Runs a tint transform: pushes the tint components, executes the procedure,
/// pops the alternate-space components.
fn run_tint_transform(
    ctx: &mut Context,
    tint_transform: &Object,
    inputs: &[f32],
    output_count: usize,
) -> PsResult<Vec<f32>> {
    for &input in inputs {
        ctx.push(Object::real(input))?;
    }
    engine::call_procedure(ctx, tint_transform.clone())?;

    let mut outputs = vec![0.0; output_count];
    for slot in outputs.iter_mut().rev() {
        *slot = ctx.pop()?.num_val()?;
    }
    Ok(outputs)
}

/// Lazy conversion of the current color to device RGB, performed when a
/// painting operator constructs a display-list element.
pub fn to_rgb(ctx: &mut Context, color: &Color) -> PsResult<Rgb> {
    let c = &color.components;
    let comp = |i: usize| c.get(i).copied().unwrap_or(0.0);

    Ok(match &color.space {
        ColorSpace::DeviceGray => gray_to_rgb(comp(0)),
        ColorSpace::DeviceRgb => Rgb::new(comp(0), comp(1), comp(2)),
        ColorSpace::DeviceCmyk => cmyk_to_rgb(comp(0), comp(1), comp(2), comp(3)),

        ColorSpace::CieBasedA(cie) => {
            // single-component spaces feed A into all three channels
            cie_to_rgb(ctx, cie, &[comp(0), comp(0), comp(0)])?
        }
        ColorSpace::CieBasedAbc(cie) => cie_to_rgb(ctx, cie, c)?,
        ColorSpace::CieBasedDef(cie) | ColorSpace::CieBasedDefg(cie) => {
            // the DEF lookup table is not consulted; decode procedures feed
            // the ABC pipeline directly
            cie_to_rgb(ctx, cie, c)?
        }

        ColorSpace::IccBased { alternate, .. } => {
            let fallback = Color {
                space: (**alternate).clone(),
                components: c.clone(),
                pattern: None,
                source: None,
            };
            to_rgb(ctx, &fallback)?
        }

        ColorSpace::Indexed { base, hival, lookup } => {
            let index = comp(0).round().max(0.0) as usize;
            if index as i32 > *hival {
                anyhow::bail!(ErrorKind::RangeCheck);
            }

            let n = base.components();
            let offset = index * n;
            let mut base_components = Vec::with_capacity(n);
            for i in 0..n {
                let byte = lookup.get(offset + i).copied().unwrap_or(0);
                base_components.push(byte as f32 / 255.0);
            }

            let base_color = Color {
                space: (**base).clone(),
                components: base_components,
                pattern: None,
                source: None,
            };
            to_rgb(ctx, &base_color)?
        }

        ColorSpace::Separation { alternate, tint_transform, .. }
        | ColorSpace::DeviceN { alternate, tint_transform, .. } => {
            let alt_components =
                run_tint_transform(ctx, tint_transform, c, alternate.components())?;
            let alt_color = Color {
                space: (**alternate).clone(),
                components: alt_components,
                pattern: None,
                source: None,
            };
            to_rgb(ctx, &alt_color)?
        }

        ColorSpace::Pattern { base } => match base {
            Some(base) => {
                let base_color = Color {
                    space: (**base).clone(),
                    components: c.clone(),
                    pattern: None,
                    source: None,
                };
                to_rgb(ctx, &base_color)?
            }
            None => Rgb::BLACK,
        },
    })
}

fn cie_space_from_dict(ctx: &Context, dict: DictHandle, components: usize) -> PsResult<CieSpace> {
    let mut cie = CieSpace::with_components(components);
    let store = ctx.vm().dict(dict);

    let read_matrix = |obj: &Object| -> PsResult<[f32; 9]> {
        let slice = obj.array_val()?;
        if slice.len != 9 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        let mut m = [0.0; 9];
        for (i, entry) in ctx.vm().array(slice).iter().enumerate() {
            m[i] = entry.num_val()?;
        }
        Ok(m)
    };

    let read_procs = |obj: &Object| -> PsResult<Vec<Object>> {
        let slice = obj.array_val()?;
        Ok(ctx.vm().array(slice).to_vec())
    };

    if let Some(obj) = store.get(&DictKey::name(b"WhitePoint")) {
        let slice = obj.array_val()?;
        if slice.len != 3 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        for (i, entry) in ctx.vm().array(slice).iter().enumerate() {
            cie.white_point[i] = entry.num_val()?;
        }
    }

    for key in [&b"MatrixABC"[..], &b"MatrixA"[..], &b"MatrixDEF"[..]] {
        if let Some(obj) = store.get(&DictKey::name(key)) {
            if key == b"MatrixA" {
                // MatrixA is the 3-element expansion of a single component
                let slice = obj.array_val()?;
                if slice.len != 3 {
                    anyhow::bail!(ErrorKind::RangeCheck);
                }
                let mut m = IDENTITY_3X3;
                for (i, entry) in ctx.vm().array(slice).iter().enumerate() {
                    m[i * 3] = entry.num_val()?;
                    m[i * 3 + 1] = 0.0;
                    m[i * 3 + 2] = 0.0;
                }
                cie.matrix_input = m;
            } else {
                cie.matrix_input = read_matrix(obj)?;
            }
        }
    }

    for key in [&b"DecodeABC"[..], &b"DecodeA"[..], &b"DecodeDEF"[..]] {
        if let Some(obj) = store.get(&DictKey::name(key)) {
            cie.decode_input = if key == b"DecodeA" {
                vec![obj.clone()]
            } else {
                read_procs(obj)?
            };
        }
    }

    if let Some(obj) = store.get(&DictKey::name(b"MatrixLMN")) {
        cie.matrix_lmn = read_matrix(obj)?;
    }
    if let Some(obj) = store.get(&DictKey::name(b"DecodeLMN")) {
        cie.decode_lmn = read_procs(obj)?;
    }

    Ok(cie)
}

/// Builds a ColorSpace from a `setcolorspace` operand: a family name or an
/// `[/Family params...]` array.
pub fn from_object(ctx: &mut Context, obj: &Object) -> PsResult<ColorSpace> {
    match &obj.value {
        Value::Name(name) => from_family(ctx, name.as_bytes(), &[]),
        Value::Array(_) | Value::PackedArray(_) => {
            let slice = obj.array_val()?;
            let entries = ctx.vm().array(slice).to_vec();
            let family = match entries.first() {
                Some(head) => head.name_val()?.clone(),
                None => anyhow::bail!(ErrorKind::RangeCheck),
            };
            from_family(ctx, family.as_bytes(), &entries[1..])
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn from_family(ctx: &mut Context, family: &[u8], params: &[Object]) -> PsResult<ColorSpace> {
    Ok(match family {
        b"DeviceGray" => ColorSpace::DeviceGray,
        b"DeviceRGB" => ColorSpace::DeviceRgb,
        b"DeviceCMYK" => ColorSpace::DeviceCmyk,

        b"CIEBasedA" | b"CIEBasedABC" | b"CIEBasedDEF" | b"CIEBasedDEFG" => {
            let dict = match params.first() {
                Some(obj) => obj.dict_val()?,
                None => anyhow::bail!(ErrorKind::RangeCheck),
            };
            match family {
                b"CIEBasedA" => {
                    ColorSpace::CieBasedA(Box::new(cie_space_from_dict(ctx, dict, 1)?))
                }
                b"CIEBasedABC" => {
                    ColorSpace::CieBasedAbc(Box::new(cie_space_from_dict(ctx, dict, 3)?))
                }
                b"CIEBasedDEF" => {
                    warn!("CIEBasedDEF lookup table ignored; using decode procedures only");
                    ColorSpace::CieBasedDef(Box::new(cie_space_from_dict(ctx, dict, 3)?))
                }
                _ => {
                    warn!("CIEBasedDEFG lookup table ignored; using decode procedures only");
                    ColorSpace::CieBasedDefg(Box::new(cie_space_from_dict(ctx, dict, 4)?))
                }
            }
        }

        b"ICCBased" => {
            // [/ICCBased dict] with /N and /Alternate; the profile stream is
            // never opened here
            let dict = match params.first() {
                Some(obj) => obj.dict_val()?,
                None => anyhow::bail!(ErrorKind::RangeCheck),
            };
            let store = ctx.vm().dict(dict);
            let components = match store.get(&DictKey::name(b"N")) {
                Some(obj) => obj.int_val()? as usize,
                None => 3,
            };
            let alternate = match store.get(&DictKey::name(b"Alternate")).cloned() {
                Some(alt) => from_object(ctx, &alt)?,
                None => match components {
                    1 => ColorSpace::DeviceGray,
                    4 => ColorSpace::DeviceCmyk,
                    _ => ColorSpace::DeviceRgb,
                },
            };
            ColorSpace::IccBased {
                components,
                alternate: Box::new(alternate),
            }
        }

        b"Indexed" => {
            let [base_obj, hival_obj, lookup_obj] = params else {
                anyhow::bail!(ErrorKind::RangeCheck);
            };
            let base = from_object(ctx, base_obj)?;
            let hival = hival_obj.int_val()?;
            if hival < 0 || hival > 4095 {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let lookup = match &lookup_obj.value {
                Value::String(s) => ctx.vm().string_bytes(*s).to_vec(),
                _ => anyhow::bail!(ErrorKind::TypeCheck),
            };
            ColorSpace::Indexed {
                base: Box::new(base),
                hival,
                lookup,
            }
        }

        b"Separation" => {
            let [name_obj, alt_obj, tint_obj] = params else {
                anyhow::bail!(ErrorKind::RangeCheck);
            };
            ColorSpace::Separation {
                name: name_obj.name_val()?.clone(),
                alternate: Box::new(from_object(ctx, alt_obj)?),
                tint_transform: tint_obj.clone(),
            }
        }

        b"DeviceN" => {
            let [names_obj, alt_obj, tint_obj] = params else {
                anyhow::bail!(ErrorKind::RangeCheck);
            };
            let names_slice = names_obj.array_val()?;
            let names = ctx
                .vm()
                .array(names_slice)
                .iter()
                .map(|entry| entry.name_val().cloned())
                .collect::<PsResult<Vec<Name>>>()?;
            ColorSpace::DeviceN {
                names,
                alternate: Box::new(from_object(ctx, alt_obj)?),
                tint_transform: tint_obj.clone(),
            }
        }

        b"Pattern" => {
            let base = match params.first() {
                Some(base_obj) => Some(Box::new(from_object(ctx, base_obj)?)),
                None => None,
            };
            ColorSpace::Pattern { base }
        }

        _ => anyhow::bail!(ErrorKind::UndefinedResource),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cmyk_black_channel_dominates() {
        assert_eq!(cmyk_to_rgb(0.0, 0.0, 0.0, 1.0), Rgb::new(0.0, 0.0, 0.0));
        assert_eq!(cmyk_to_rgb(1.0, 0.0, 0.0, 0.0), Rgb::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn ntsc_gray_weights_sum_to_one() {
        assert!((rgb_to_gray(Rgb::WHITE) - 1.0).abs() < 1e-6);
        assert_eq!(rgb_to_gray(Rgb::BLACK), 0.0);
    }

    #[test]
    fn rgb_cmyk_round_trip_on_primaries() {
        let (c, m, y, k) = rgb_to_cmyk(Rgb::new(1.0, 0.0, 0.0));
        let back = cmyk_to_rgb(c, m, y, k);
        assert!((back.r - 1.0).abs() < 1e-6);
        assert!(back.g.abs() < 1e-6);
    }

    #[test]
    fn initial_cmyk_color_is_black() {
        assert_eq!(ColorSpace::DeviceCmyk.initial_components(), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn separation_initial_tint_is_full() {
        let space = ColorSpace::Separation {
            name: Name::new(b"Spot"),
            alternate: Box::new(ColorSpace::DeviceGray),
            tint_transform: Object::null(),
        };
        assert_eq!(space.initial_components(), vec![1.0]);
    }
}
