use super::read_source;
use crate::buffer::Pixel;
use crate::graph::NodeContext;
use crate::operation::{Operation, OperationKind, ProcessError};
use crate::rect::Rect;

/// Porter-Duff over: `aux` composited on top of `input`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Over;

impl Operation for Over {
    fn name(&self) -> &'static str {
        "over"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Composer
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let below = read_source(context, "input", result);
        let above = read_source(context, "aux", result);
        let pixels: Vec<Pixel> = below
            .iter()
            .zip(&above)
            .map(|(b, a)| {
                let keep = 1.0 - a[3];
                [
                    a[0] + b[0] * keep,
                    a[1] + b[1] * keep,
                    a[2] + b[2] * keep,
                    a[3] + b[3] * keep,
                ]
            })
            .collect();
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}
