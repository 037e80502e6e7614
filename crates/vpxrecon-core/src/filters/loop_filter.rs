//! Loop-filter edge kernels.
//!
//! Each line filter works on one line of pixels crossing an edge. `origin`
//! indexes `q0`, the first pixel after the edge, and `step` is the distance
//! between successive pixels across the edge (1 for vertical edges, the
//! plane pitch for horizontal edges).

use crate::models::{EdgeKind, EdgeLimits, LoopFilterType};

/// Pixels filtered along a luma edge.
pub const LUMA_EDGE_LINES: usize = 16;
/// Pixels filtered along a chroma edge.
pub const CHROMA_EDGE_LINES: usize = 8;

#[inline]
fn signed_clamp(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline]
fn to_signed(px: u8) -> i32 {
    (px ^ 0x80) as i8 as i32
}

#[inline]
fn to_pixel(v: i32) -> u8 {
    (v as i8 as u8) ^ 0x80
}

/// Eight pixels straddling an edge: `p3 p2 p1 p0 | q0 q1 q2 q3`.
struct EdgeLine {
    px: [u8; 8],
}

impl EdgeLine {
    fn load(buf: &[u8], origin: usize, step: usize) -> Self {
        let mut px = [0u8; 8];
        for (i, p) in px.iter_mut().enumerate() {
            *p = buf[origin + i * step - 4 * step];
        }
        Self { px }
    }

    fn store(&self, buf: &mut [u8], origin: usize, step: usize, first: usize, last: usize) {
        for i in first..=last {
            buf[origin + i * step - 4 * step] = self.px[i];
        }
    }

    fn p(&self, n: usize) -> i32 {
        self.px[3 - n] as i32
    }

    fn q(&self, n: usize) -> i32 {
        self.px[4 + n] as i32
    }
}

fn filter_mask(limit: i32, blimit: i32, line: &EdgeLine) -> bool {
    let (p3, p2, p1, p0) = (line.p(3), line.p(2), line.p(1), line.p(0));
    let (q0, q1, q2, q3) = (line.q(0), line.q(1), line.q(2), line.q(3));

    (p3 - p2).abs() <= limit
        && (p2 - p1).abs() <= limit
        && (p1 - p0).abs() <= limit
        && (q1 - q0).abs() <= limit
        && (q2 - q1).abs() <= limit
        && (q3 - q2).abs() <= limit
        && (p0 - q0).abs() * 2 + (p1 - q1).abs() / 2 <= blimit
}

fn high_edge_variance(thresh: i32, line: &EdgeLine) -> bool {
    (line.p(1) - line.p(0)).abs() > thresh || (line.q(1) - line.q(0)).abs() > thresh
}

/// Reads only `p1 p0 q0 q1`, so the simple filter can run two lines from
/// the frame start.
fn simple_mask(blimit: i32, [p1, p0, q0, q1]: [i32; 4]) -> bool {
    (p0 - q0).abs() * 2 + (p1 - q1).abs() / 2 <= blimit
}

/// Inner-edge filter on one line. Adjusts `p1 p0 q0 q1`.
pub fn loop_filter_line(buf: &mut [u8], origin: usize, step: usize, blimit: u8, limit: u8, thresh: u8) {
    let mut line = EdgeLine::load(buf, origin, step);
    if !filter_mask(limit as i32, blimit as i32, &line) {
        return;
    }
    let hev = high_edge_variance(thresh as i32, &line);

    let ps1 = to_signed(line.px[2]);
    let ps0 = to_signed(line.px[3]);
    let qs0 = to_signed(line.px[4]);
    let qs1 = to_signed(line.px[5]);

    let mut value = if hev { signed_clamp(ps1 - qs1) } else { 0 };
    value = signed_clamp(value + 3 * (qs0 - ps0));

    let filter1 = signed_clamp(value + 4) >> 3;
    let filter2 = signed_clamp(value + 3) >> 3;
    line.px[4] = to_pixel(signed_clamp(qs0 - filter1));
    line.px[3] = to_pixel(signed_clamp(ps0 + filter2));

    if !hev {
        let outer = (filter1 + 1) >> 1;
        line.px[5] = to_pixel(signed_clamp(qs1 - outer));
        line.px[2] = to_pixel(signed_clamp(ps1 + outer));
    }

    line.store(buf, origin, step, 2, 5);
}

/// Macroblock-edge filter on one line. Adjusts `p2..q2`.
pub fn mb_loop_filter_line(buf: &mut [u8], origin: usize, step: usize, blimit: u8, limit: u8, thresh: u8) {
    let mut line = EdgeLine::load(buf, origin, step);
    if !filter_mask(limit as i32, blimit as i32, &line) {
        return;
    }
    let hev = high_edge_variance(thresh as i32, &line);

    let ps2 = to_signed(line.px[1]);
    let mut ps1 = to_signed(line.px[2]);
    let mut ps0 = to_signed(line.px[3]);
    let mut qs0 = to_signed(line.px[4]);
    let mut qs1 = to_signed(line.px[5]);
    let qs2 = to_signed(line.px[6]);

    let mut value = signed_clamp(ps1 - qs1);
    value = signed_clamp(value + 3 * (qs0 - ps0));

    if hev {
        let filter1 = signed_clamp(value + 4) >> 3;
        let filter2 = signed_clamp(value + 3) >> 3;
        qs0 = signed_clamp(qs0 - filter1);
        ps0 = signed_clamp(ps0 + filter2);
        line.px[3] = to_pixel(ps0);
        line.px[4] = to_pixel(qs0);
    } else {
        let u = signed_clamp((63 + value * 27) >> 7);
        qs0 = signed_clamp(qs0 - u);
        ps0 = signed_clamp(ps0 + u);

        let u = signed_clamp((63 + value * 18) >> 7);
        qs1 = signed_clamp(qs1 - u);
        ps1 = signed_clamp(ps1 + u);

        let u = signed_clamp((63 + value * 9) >> 7);
        line.px[1] = to_pixel(signed_clamp(ps2 + u));
        line.px[2] = to_pixel(ps1);
        line.px[3] = to_pixel(ps0);
        line.px[4] = to_pixel(qs0);
        line.px[5] = to_pixel(qs1);
        line.px[6] = to_pixel(signed_clamp(qs2 - u));
    }

    line.store(buf, origin, step, 1, 6);
}

/// Simple filter on one line. Adjusts `p0 q0` only.
pub fn simple_loop_filter_line(buf: &mut [u8], origin: usize, step: usize, blimit: u8) {
    let p1 = buf[origin - 2 * step];
    let p0 = buf[origin - step];
    let q0 = buf[origin];
    let q1 = buf[origin + step];

    if !simple_mask(blimit as i32, [p1, p0, q0, q1].map(i32::from)) {
        return;
    }

    let (ps1, ps0, qs0, qs1) = (to_signed(p1), to_signed(p0), to_signed(q0), to_signed(q1));
    let mut value = signed_clamp(ps1 - qs1);
    value = signed_clamp(value + 3 * (qs0 - ps0));

    let filter1 = signed_clamp(value + 4) >> 3;
    buf[origin] = to_pixel(signed_clamp(qs0 - filter1));
    let filter2 = signed_clamp(value + 3) >> 3;
    buf[origin - step] = to_pixel(signed_clamp(ps0 + filter2));
}

/// One edge-filter launch over a frame: the CPU twin of the device kernels.
#[derive(Debug)]
pub struct EdgeLaunch<'a> {
    pub kind: EdgeKind,
    pub frame: &'a mut [u8],
    pub block_offsets: &'a [i32],
    pub pitches: &'a [i32],
    pub limits: &'a [EdgeLimits],
    pub levels: &'a [u32],
    pub use_mbflim: bool,
    pub filter_type: LoopFilterType,
    pub cur_iter: i32,
    pub plane_count: usize,
    pub block_count: usize,
    pub max_threads: usize,
}

/// Run every work item `(t, plane, block)` of an edge-filter launch.
///
/// Items outside the plane's edge length, blocks with a zero level, and
/// chroma planes under the simple filter are no-ops. Offsets that fall
/// outside the frame are skipped.
pub fn filter_edges(launch: EdgeLaunch<'_>) {
    let EdgeLaunch {
        kind,
        frame,
        block_offsets,
        pitches,
        limits,
        levels,
        use_mbflim,
        filter_type,
        cur_iter,
        plane_count,
        block_count,
        max_threads,
    } = launch;

    for block in 0..block_count {
        for plane in 0..plane_count {
            for t in 0..max_threads {
                filter_edge_item(
                    kind,
                    frame,
                    EdgeItem {
                        t,
                        plane,
                        block,
                        block_count,
                    },
                    block_offsets,
                    pitches,
                    limits,
                    levels,
                    use_mbflim,
                    filter_type,
                    cur_iter,
                );
            }
        }
    }
}

struct EdgeItem {
    t: usize,
    plane: usize,
    block: usize,
    block_count: usize,
}

#[allow(clippy::too_many_arguments)]
fn filter_edge_item(
    kind: EdgeKind,
    frame: &mut [u8],
    item: EdgeItem,
    block_offsets: &[i32],
    pitches: &[i32],
    limits: &[EdgeLimits],
    levels: &[u32],
    use_mbflim: bool,
    filter_type: LoopFilterType,
    cur_iter: i32,
) {
    let EdgeItem {
        t,
        plane,
        block,
        block_count,
    } = item;

    if filter_type == LoopFilterType::Simple && plane != 0 {
        return;
    }
    let lines = if plane == 0 { LUMA_EDGE_LINES } else { CHROMA_EDGE_LINES };
    if t >= lines {
        return;
    }
    let (Some(&level), Some(lim), Some(&offset), Some(&pitch)) = (
        levels.get(block),
        limits.get(block),
        block_offsets.get(plane * block_count + block),
        pitches.get(plane),
    ) else {
        return;
    };
    if level == 0 || pitch <= 0 {
        return;
    }

    let pitch = pitch as i64;
    let (across, along) = if kind.is_horizontal() { (pitch, 1) } else { (1, pitch) };
    let origin = offset as i64 + cur_iter as i64 * 4 * across + t as i64 * along;

    let reach = if kind == EdgeKind::SimpleHorizontal || kind == EdgeKind::SimpleVertical {
        2
    } else {
        4
    };
    if origin - reach * across < 0 || origin + (reach - 1) * across >= frame.len() as i64 {
        return;
    }

    let origin = origin as usize;
    let step = across as usize;
    let blimit = if use_mbflim { lim.mblim } else { lim.blim } as u8;

    match kind {
        EdgeKind::LoopFilterHorizontal | EdgeKind::LoopFilterVertical => {
            loop_filter_line(frame, origin, step, blimit, lim.lim as u8, lim.hev_thresh as u8)
        }
        EdgeKind::MbLoopFilterHorizontal | EdgeKind::MbLoopFilterVertical => {
            mb_loop_filter_line(frame, origin, step, blimit, lim.lim as u8, lim.hev_thresh as u8)
        }
        EdgeKind::SimpleHorizontal | EdgeKind::SimpleVertical => {
            simple_loop_filter_line(frame, origin, step, blimit)
        }
    }
}
