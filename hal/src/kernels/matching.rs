use crate::gpu::GpuContext;
use pano_core::{Error, KeyPoint, Result};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MatchParams {
    n_source: u32,
    n_target: u32,
    patch_len: u32,
    _pad: u32,
}

/// Keypoint descriptors flattened for upload: `count * patch_len`
/// floats plus a validity mask for keypoints without a descriptor
/// (window clipped by the image edge).
pub struct PatchSet {
    data: Vec<f32>,
    valid: Vec<u32>,
    count: usize,
    patch_len: usize,
}

impl PatchSet {
    pub fn from_keypoints(keypoints: &[KeyPoint], patch_len: usize) -> Self {
        let mut data = Vec::with_capacity(keypoints.len() * patch_len);
        let mut valid = Vec::with_capacity(keypoints.len());
        for kp in keypoints {
            match &kp.patch {
                Some(patch) if patch.len() == patch_len => {
                    data.extend_from_slice(patch);
                    valid.push(1);
                }
                _ => {
                    data.extend(std::iter::repeat(0.0).take(patch_len));
                    valid.push(0);
                }
            }
        }
        Self {
            data,
            valid,
            count: keypoints.len(),
            patch_len,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Exhaustive SSD matching on the device: one thread per source
/// keypoint, scanning every valid target descriptor. Returns, per
/// source keypoint, the best target index and its SSD, or `None` when
/// the source has no descriptor, no valid target exists, or the best
/// distance is not finite.
pub fn match_patches(
    ctx: &GpuContext,
    source: &PatchSet,
    target: &PatchSet,
) -> Result<Vec<Option<(usize, f64)>>> {
    if source.patch_len != target.patch_len {
        return Err(Error::invalid_config(format!(
            "descriptor lengths differ: {} vs {}",
            source.patch_len, target.patch_len
        )));
    }
    if source.count == 0 || target.count == 0 {
        return Ok(vec![None; source.count]);
    }

    let src_patches = ctx.storage_buffer("source patches", &source.data);
    let src_valid = ctx.storage_buffer("source valid", &source.valid);
    let tgt_patches = ctx.storage_buffer("target patches", &target.data);
    let tgt_valid = ctx.storage_buffer("target valid", &target.valid);
    let results = ctx.empty_storage_buffer::<[f32; 4]>("match results", source.count);
    let params = ctx.uniform_buffer(
        "match params",
        &MatchParams {
            n_source: source.count as u32,
            n_target: target.count as u32,
            patch_len: source.patch_len as u32,
            _pad: 0,
        },
    );

    let pipeline =
        ctx.create_compute_pipeline(include_str!("../../shaders/match_ssd.wgsl"), "main");
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("match ssd"),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &[
            entry(0, &src_patches),
            entry(1, &src_valid),
            entry(2, &tgt_patches),
            entry(3, &tgt_valid),
            entry(4, &results),
            entry(5, &params),
        ],
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("match ssd"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("match ssd"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((source.count as u32 + 63) / 64, 1, 1);
    }
    ctx.submit(encoder);

    let raw = ctx.read_back::<[f32; 4]>(&results, source.count)?;
    Ok(raw
        .into_iter()
        .map(|[idx, ssd, valid, _]| {
            if valid == 0.0 || idx < 0.0 || !ssd.is_finite() {
                None
            } else {
                Some((idx as usize, ssd as f64))
            }
        })
        .collect())
}

fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
