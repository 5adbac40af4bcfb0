use ijview_primitives::{AxisPosition, Sample};

/// Formats the viewer status bar.
///
/// `X:{x} Y:{y} Value:{v}  Z:{z} T:{t} C:{c}  Zoom:{pct}%  {message}`, with
/// dashes in place of the sample when the pointer is off the image.
pub fn status_line(sample: Option<Sample>, position: AxisPosition, zoom: f64, message: &str) -> String {
	let sample_text = match sample {
		Some(sample) => format!("X:{} Y:{} Value:{:.4}", sample.x, sample.y, sample.value),
		None => "X:- Y:- Value:-".to_string(),
	};
	let line = format!(
		"{sample_text}  Z:{} T:{} C:{}  Zoom:{:.0}%  {message}",
		position.z,
		position.t,
		position.channel,
		zoom * 100.0
	);
	line.trim_end().to_string()
}
