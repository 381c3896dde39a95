use ndarray::{Array2, Array4};
use ort::{inputs, session::Session, value::Tensor};

use crate::error::VisionError;

/// 每个候选框的参数个数：[x1, y1, x2, y2, score, class]
pub const ROW_PARAMS: usize = 6;

/// 运行模型推理
///
/// # 参数
/// * `model` - ONNX模型Session
/// * `input_name` - 模型输入节点名称
/// * `input` - 输入张量，形状应为(1, 3, height, width)
///
/// # 返回值
/// 返回形状为(num_boxes, 6)的二维数组，每行为 `[x1, y1, x2, y2, score, class]`，
/// 坐标相对于模型输入尺寸
pub fn run_inference(
    model: &mut Session,
    input_name: &str,
    input: &Array4<f32>,
) -> Result<Array2<f32>, VisionError> {
    let shape: Vec<usize> = input.shape().to_vec();
    let (data, _offset) = input.clone().into_raw_vec_and_offset();
    let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data))?;
    let outputs = model.run(inputs![input_name => input_tensor])?;

    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.to_vec();
    rows_from_output(&dims, data)
}

/// 将 `[1, num_boxes, num_params]` 的输出整理为二维数组
pub fn rows_from_output(dims: &[i64], data: &[f32]) -> Result<Array2<f32>, VisionError> {
    if dims.len() != 3 || dims[0] != 1 {
        return Err(VisionError::Output(format!(
            "expected [1, boxes, params], got {dims:?}"
        )));
    }
    let boxes = dims[1] as usize;
    let params = dims[2] as usize;
    if params < ROW_PARAMS {
        return Err(VisionError::Output(format!(
            "each box needs {ROW_PARAMS} values, got {params}"
        )));
    }

    let all = Array2::from_shape_vec((boxes, params), data.to_vec())?;
    Ok(all.slice(ndarray::s![.., 0..ROW_PARAMS]).to_owned())
}
