//! The std140 uniform block synthesised from a fragment source's loose
//! `uniform` declarations, and the per-frame CPU copy written into it.
//!
//! Every member is stored in a type whose size equals its alignment (`vec3`
//! widens to `vec4`, `bool` narrows to `uint`), so offsets never depend on
//! how a compiler packs the tail of a `vec3`.

use crate::types::UniformValue;

/// Name of the internal member carrying the viewport size, always at offset 0.
pub(crate) const VIEWPORT_MEMBER: &str = "workshop_viewport";
/// Instance name of the generated block.
pub(crate) const BLOCK_INSTANCE: &str = "workshop";
const MEMBER_PREFIX: &str = "u_";

/// Non-opaque GLSL types accepted as loose uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlslType {
    Float,
    Int,
    Uint,
    Bool,
    Vec2,
    Vec3,
    Vec4,
}

impl GlslType {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "float" => GlslType::Float,
            "int" => GlslType::Int,
            "uint" => GlslType::Uint,
            "bool" => GlslType::Bool,
            "vec2" => GlslType::Vec2,
            "vec3" => GlslType::Vec3,
            "vec4" => GlslType::Vec4,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            GlslType::Float => "float",
            GlslType::Int => "int",
            GlslType::Uint => "uint",
            GlslType::Bool => "bool",
            GlslType::Vec2 => "vec2",
            GlslType::Vec3 => "vec3",
            GlslType::Vec4 => "vec4",
        }
    }

    fn storage(self) -> &'static str {
        match self {
            GlslType::Bool => "uint",
            GlslType::Vec3 => "vec4",
            other => other.name(),
        }
    }

    fn size(self) -> u32 {
        match self {
            GlslType::Float | GlslType::Int | GlslType::Uint | GlslType::Bool => 4,
            GlslType::Vec2 => 8,
            GlslType::Vec3 | GlslType::Vec4 => 16,
        }
    }

    /// Expression reading the member back as the declared type.
    fn accessor(self, member: &str) -> String {
        match self {
            GlslType::Bool => format!("bool({BLOCK_INSTANCE}.{member})"),
            GlslType::Vec3 => format!("{BLOCK_INSTANCE}.{member}.xyz"),
            _ => format!("{BLOCK_INSTANCE}.{member}"),
        }
    }
}

/// Where one uniform lives inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSlot {
    offset: u32,
    ty: GlslType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UniformField {
    name: String,
    slot: GpuSlot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformLayout {
    fields: Vec<UniformField>,
    cursor: u32,
}

impl Default for UniformLayout {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            cursor: GlslType::Vec2.size(),
        }
    }
}

impl UniformLayout {
    /// Appends `name`. Redeclaring a name with the same type is a no-op.
    pub fn push(&mut self, name: &str, ty: GlslType) -> Result<(), String> {
        if let Some(existing) = self.fields.iter().find(|field| field.name == name) {
            if existing.slot.ty == ty {
                return Ok(());
            }
            return Err(format!(
                "uniform '{name}' redeclared as {} (previously {})",
                ty.name(),
                existing.slot.ty.name()
            ));
        }
        let size = ty.size();
        let offset = self.cursor.next_multiple_of(size);
        self.cursor = offset + size;
        self.fields.push(UniformField {
            name: name.to_string(),
            slot: GpuSlot { offset, ty },
        });
        Ok(())
    }

    pub fn slot(&self, name: &str) -> Option<GpuSlot> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.slot)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Block size in bytes, rounded up to the std140 struct alignment.
    pub fn size(&self) -> u64 {
        u64::from(self.cursor.next_multiple_of(16))
    }

    /// GLSL declaration of the block followed by the `#define` aliases that
    /// map each declared name onto its member.
    pub fn declaration(&self) -> String {
        let mut block = format!(
            "layout(std140, set = 0, binding = 0) uniform WorkshopParams {{\n    \
             vec2 {VIEWPORT_MEMBER};\n"
        );
        for field in &self.fields {
            block.push_str(&format!(
                "    {} {MEMBER_PREFIX}{};\n",
                field.slot.ty.storage(),
                field.name
            ));
        }
        block.push_str(&format!("}} {BLOCK_INSTANCE};\n"));
        for field in &self.fields {
            let member = format!("{MEMBER_PREFIX}{}", field.name);
            block.push_str(&format!(
                "#define {} {}\n",
                field.name,
                field.slot.ty.accessor(&member)
            ));
        }
        block
    }
}

/// CPU copy of one frame's block contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    /// Zeroes the block for a program whose layout is `size` bytes.
    pub fn reset(&mut self, size: u64) {
        self.bytes.clear();
        self.bytes.resize(size as usize, 0);
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.put(0, bytemuck::cast_slice(&[width as f32, height as f32]));
    }

    /// Encodes `value` as the slot's declared type. Values that cannot
    /// represent that type are skipped.
    pub fn write(&mut self, slot: GpuSlot, value: UniformValue) {
        let offset = slot.offset as usize;
        match (slot.ty, value) {
            (GlslType::Float, UniformValue::Float(v)) => self.put(offset, bytemuck::bytes_of(&v)),
            (GlslType::Float, UniformValue::Int(v)) => {
                self.put(offset, bytemuck::bytes_of(&(v as f32)))
            }
            (GlslType::Int, UniformValue::Int(v)) => self.put(offset, bytemuck::bytes_of(&v)),
            (GlslType::Int, UniformValue::Float(v)) => {
                self.put(offset, bytemuck::bytes_of(&(v.round() as i32)))
            }
            (GlslType::Uint, UniformValue::Int(v)) => {
                self.put(offset, bytemuck::bytes_of(&(v.max(0) as u32)))
            }
            (GlslType::Bool, UniformValue::Int(v)) => {
                self.put(offset, bytemuck::bytes_of(&u32::from(v != 0)))
            }
            (GlslType::Bool, UniformValue::Float(v)) => {
                self.put(offset, bytemuck::bytes_of(&u32::from(v != 0.0)))
            }
            (GlslType::Vec2, UniformValue::Vec2(v)) => self.put(offset, bytemuck::cast_slice(&v)),
            (GlslType::Vec3 | GlslType::Vec4, UniformValue::Vec3([r, g, b])) => {
                self.put(offset, bytemuck::cast_slice(&[r, g, b, 1.0]))
            }
            (ty, value) => {
                tracing::trace!(ty = ty.name(), ?value, "uniform value does not fit slot type");
            }
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn put(&mut self, offset: usize, data: &[u8]) {
        if let Some(target) = self.bytes.get_mut(offset..offset + data.len()) {
            target.copy_from_slice(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_follow_the_viewport() {
        let mut layout = UniformLayout::default();
        layout.push("time", GlslType::Float).unwrap();
        layout.push("resolution", GlslType::Vec2).unwrap();
        layout.push("tint", GlslType::Vec3).unwrap();
        layout.push("enabled", GlslType::Bool).unwrap();

        assert_eq!(layout.slot("time").unwrap().offset, 8);
        assert_eq!(layout.slot("resolution").unwrap().offset, 16);
        assert_eq!(layout.slot("tint").unwrap().offset, 32);
        assert_eq!(layout.slot("enabled").unwrap().offset, 48);
        assert_eq!(layout.size(), 64);
        assert_eq!(layout.slot("mouse"), None);
    }

    #[test]
    fn redeclaration_must_agree() {
        let mut layout = UniformLayout::default();
        layout.push("time", GlslType::Float).unwrap();
        layout.push("time", GlslType::Float).unwrap();
        assert_eq!(layout.len(), 1);
        assert!(layout.push("time", GlslType::Int).is_err());
    }

    #[test]
    fn declaration_aliases_names() {
        let mut layout = UniformLayout::default();
        layout.push("tint", GlslType::Vec3).unwrap();
        layout.push("enabled", GlslType::Bool).unwrap();
        let declaration = layout.declaration();
        assert!(declaration.contains("    vec2 workshop_viewport;\n"));
        assert!(declaration.contains("    vec4 u_tint;\n"));
        assert!(declaration.contains("    uint u_enabled;\n"));
        assert!(declaration.contains("#define tint workshop.u_tint.xyz\n"));
        assert!(declaration.contains("#define enabled bool(workshop.u_enabled)\n"));
    }

    #[test]
    fn block_encodes_by_slot_type() {
        let mut layout = UniformLayout::default();
        layout.push("time", GlslType::Float).unwrap();
        layout.push("steps", GlslType::Int).unwrap();
        layout.push("tint", GlslType::Vec3).unwrap();

        let mut block = UniformBlock::default();
        block.reset(layout.size());
        block.set_viewport(640, 480);
        block.write(layout.slot("time").unwrap(), UniformValue::Float(2.5));
        block.write(layout.slot("steps").unwrap(), UniformValue::Int(-3));
        block.write(layout.slot("tint").unwrap(), UniformValue::Vec3([1.0, 0.5, 0.0]));

        let words: Vec<[u8; 4]> = block
            .bytes()
            .chunks_exact(4)
            .map(|chunk| [chunk[0], chunk[1], chunk[2], chunk[3]])
            .collect();
        let floats: Vec<f32> = words.iter().map(|word| f32::from_le_bytes(*word)).collect();
        assert_eq!(&floats[0..3], &[640.0, 480.0, 2.5]);
        assert_eq!(i32::from_le_bytes(words[3]), -3);
        assert_eq!(&floats[4..8], &[1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn mismatched_values_are_skipped() {
        let mut layout = UniformLayout::default();
        layout.push("resolution", GlslType::Vec2).unwrap();
        let mut block = UniformBlock::default();
        block.reset(layout.size());
        block.write(layout.slot("resolution").unwrap(), UniformValue::Float(1.0));
        assert!(block.bytes().iter().all(|byte| *byte == 0));
    }
}
