use crate::gpu::GpuContext;
use pano_core::Result;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ScoreParams {
    n_candidates: u32,
    n_matches: u32,
    threshold_sq: f32,
    _pad: u32,
}

/// Score a batch of candidate homographies on the device: one thread
/// per candidate counts the correspondences whose reprojection error
/// is below `threshold`. Counts rank candidates only; the winner's
/// inlier set is recomputed on the host in double precision before the
/// final refit.
pub fn count_inliers(
    ctx: &GpuContext,
    models: &[[f32; 9]],
    points: &[[f32; 4]],
    threshold: f64,
) -> Result<Vec<u32>> {
    if models.is_empty() || points.is_empty() {
        return Ok(vec![0; models.len()]);
    }

    let flat: Vec<f32> = models.iter().flatten().copied().collect();
    let model_buf = ctx.storage_buffer("candidate models", &flat);
    let point_buf = ctx.storage_buffer("correspondences", points);
    let count_buf = ctx.empty_storage_buffer::<u32>("inlier counts", models.len());
    let thr = threshold as f32;
    let params = ctx.uniform_buffer(
        "score params",
        &ScoreParams {
            n_candidates: models.len() as u32,
            n_matches: points.len() as u32,
            threshold_sq: thr * thr,
            _pad: 0,
        },
    );

    let pipeline =
        ctx.create_compute_pipeline(include_str!("../../shaders/ransac_score.wgsl"), "main");
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("ransac score"),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: point_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: count_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: params.as_entire_binding(),
            },
        ],
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ransac score"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("ransac score"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((models.len() as u32 + 63) / 64, 1, 1);
    }
    ctx.submit(encoder);

    ctx.read_back::<u32>(&count_buf, models.len())
}
