//! 纯尺寸计算：不接触像素，全部可脱离图片单测。

/// 源图上的裁剪区域。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

fn div_round(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

/// 与目标同比例的最大居中区域：源图相对更宽则对称裁宽，否则对称裁高。
///
/// cover-fit 和 center-crop 都先在源图上取这个区域，再缩放到目标尺寸，
/// 中间缓冲不会超过源图大小。
///
/// 比例相同（含尺寸完全一致）时返回整张图。
pub fn center_crop_rect(source: (u32, u32), target: (u32, u32)) -> Rect {
    let (sw, sh) = source;
    let (tw, th) = target;
    let (sw64, sh64, tw64, th64) = (sw as u64, sh as u64, tw as u64, th as u64);

    if sw64 * th64 > sh64 * tw64 {
        let cw = div_round(sh64 * tw64, th64).clamp(1, sw64) as u32;
        Rect {
            x: (sw - cw) / 2,
            y: 0,
            width: cw,
            height: sh,
        }
    } else {
        let ch = div_round(sw64 * th64, tw64).clamp(1, sh64) as u32;
        Rect {
            x: 0,
            y: (sh - ch) / 2,
            width: sw,
            height: ch,
        }
    }
}
