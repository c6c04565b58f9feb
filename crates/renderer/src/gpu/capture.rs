//! Read-back of a rendered frame into an RGBA image.

use crossbeam_channel::bounded;
use image::RgbaImage;

use crate::device::FrameError;

use super::pipeline::{encode_draw, GpuProgram};

/// Re-renders `program` (with the uniform bytes already queued for this
/// frame) into an offscreen texture and reads it back.
pub(crate) fn capture_frame(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    program: &GpuProgram,
    format: wgpu::TextureFormat,
    (width, height): (u32, u32),
) -> Result<RgbaImage, FrameError> {
    let swizzle = match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        other => {
            return Err(FrameError::Capture(format!(
                "unsupported surface format {other:?}"
            )))
        }
    };

    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("workshop capture target"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let unpadded_bytes_per_row = width * 4;
    let padded_bytes_per_row =
        unpadded_bytes_per_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("workshop capture readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("workshop capture encoder"),
    });
    encode_draw(
        &mut encoder,
        &view,
        program,
        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
    );
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        size,
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| FrameError::Capture(format!("device poll failed: {err}")))?;
    rx.recv()
        .map_err(|err| FrameError::Capture(format!("map channel closed: {err}")))?
        .map_err(|err| FrameError::Capture(format!("map failed: {err}")))?;

    let data = slice.get_mapped_range();
    let mut rgba = strip_row_padding(
        &data,
        unpadded_bytes_per_row as usize,
        padded_bytes_per_row as usize,
        height as usize,
    );
    drop(data);
    readback.unmap();

    if swizzle {
        for pixel in rgba.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| FrameError::Capture("read-back size mismatch".into()))
}

fn strip_row_padding(data: &[u8], row: usize, padded_row: usize, rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row * rows);
    for chunk in data.chunks(padded_row).take(rows) {
        out.extend_from_slice(&chunk[..row.min(chunk.len())]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_padding_from_each_row() {
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        assert_eq!(strip_row_padding(&data, 4, 8, 2), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
