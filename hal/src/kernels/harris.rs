use crate::gpu::GpuContext;
use pano_core::{Error, ImageGrid, Result};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GridParams {
    width: u32,
    height: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ConvolveParams {
    width: u32,
    height: u32,
    ksize: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ResponseParams {
    width: u32,
    height: u32,
    k: f32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct NmsParams {
    width: u32,
    height: u32,
    radius: u32,
    threshold: f32,
}

fn grid_dispatch(width: u32, height: u32) -> (u32, u32) {
    ((width + 15) / 16, (height + 15) / 16)
}

/// Full detection front end on the device: Sobel structure-tensor
/// products, Gaussian smoothing of each channel, Harris response, then
/// threshold plus non-maximum suppression. Returns the suppressed
/// response map; surviving pixels carry their response, everything
/// else is zero.
///
/// All six passes are recorded into one encoder; passes in a single
/// encoder execute in order, so each stage sees the previous stage's
/// writes.
#[allow(clippy::too_many_arguments)]
pub fn suppressed_response(
    ctx: &GpuContext,
    image: &ImageGrid,
    gaussian: &[f32],
    gaussian_size: usize,
    k: f32,
    threshold: f32,
    nonmax_radius: usize,
) -> Result<ImageGrid> {
    if gaussian.len() != gaussian_size * gaussian_size || gaussian_size % 2 == 0 {
        return Err(Error::invalid_config(format!(
            "smoothing kernel must be odd-sided and square, got {} entries for side {gaussian_size}",
            gaussian.len()
        )));
    }
    let (width, height) = (image.cols() as u32, image.rows() as u32);
    let len = image.rows() * image.cols();

    let input = ctx.storage_buffer("harris input", image.as_slice());
    let kern = ctx.storage_buffer("harris gaussian", gaussian);
    let ixx = ctx.empty_storage_buffer::<f32>("harris ixx", len);
    let iyy = ctx.empty_storage_buffer::<f32>("harris iyy", len);
    let ixy = ctx.empty_storage_buffer::<f32>("harris ixy", len);
    let sxx = ctx.empty_storage_buffer::<f32>("harris sxx", len);
    let syy = ctx.empty_storage_buffer::<f32>("harris syy", len);
    let sxy = ctx.empty_storage_buffer::<f32>("harris sxy", len);
    let response = ctx.empty_storage_buffer::<f32>("harris response", len);
    let suppressed = ctx.empty_storage_buffer::<f32>("harris suppressed", len);

    let sobel_pipeline =
        ctx.create_compute_pipeline(include_str!("../../shaders/sobel_products.wgsl"), "main");
    let convolve_pipeline =
        ctx.create_compute_pipeline(include_str!("../../shaders/convolve2d.wgsl"), "main");
    let response_pipeline =
        ctx.create_compute_pipeline(include_str!("../../shaders/harris_response.wgsl"), "main");
    let nms_pipeline = ctx.create_compute_pipeline(include_str!("../../shaders/nms.wgsl"), "main");

    let grid_params = ctx.uniform_buffer("grid params", &GridParams { width, height });
    let convolve_params = ctx.uniform_buffer(
        "convolve params",
        &ConvolveParams {
            width,
            height,
            ksize: gaussian_size as u32,
            _pad: 0,
        },
    );
    let response_params = ctx.uniform_buffer(
        "response params",
        &ResponseParams {
            width,
            height,
            k,
            _pad: 0,
        },
    );
    let nms_params = ctx.uniform_buffer(
        "nms params",
        &NmsParams {
            width,
            height,
            radius: nonmax_radius as u32,
            threshold,
        },
    );

    let sobel_bind = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sobel products"),
        layout: &sobel_pipeline.get_bind_group_layout(0),
        entries: &[
            bind(0, &input),
            bind(1, &ixx),
            bind(2, &iyy),
            bind(3, &ixy),
            bind(4, &grid_params),
        ],
    });
    let smooth_binds = [(&ixx, &sxx), (&iyy, &syy), (&ixy, &sxy)].map(|(src, dst)| {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tensor smoothing"),
            layout: &convolve_pipeline.get_bind_group_layout(0),
            entries: &[bind(0, src), bind(1, &kern), bind(2, dst), bind(3, &convolve_params)],
        })
    });
    let response_bind = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("harris response"),
        layout: &response_pipeline.get_bind_group_layout(0),
        entries: &[
            bind(0, &sxx),
            bind(1, &syy),
            bind(2, &sxy),
            bind(3, &response),
            bind(4, &response_params),
        ],
    });
    let nms_bind = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("nms"),
        layout: &nms_pipeline.get_bind_group_layout(0),
        entries: &[bind(0, &response), bind(1, &suppressed), bind(2, &nms_params)],
    });

    let (wg_x, wg_y) = grid_dispatch(width, height);
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("harris front end"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sobel products"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&sobel_pipeline);
        pass.set_bind_group(0, &sobel_bind, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
    for smooth_bind in &smooth_binds {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("tensor smoothing"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&convolve_pipeline);
        pass.set_bind_group(0, smooth_bind, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("harris response"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&response_pipeline);
        pass.set_bind_group(0, &response_bind, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("nms"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&nms_pipeline);
        pass.set_bind_group(0, &nms_bind, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
    ctx.submit(encoder);

    let out = ctx.read_back::<f32>(&suppressed, len)?;
    ImageGrid::from_vec(image.rows(), image.cols(), out)
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
