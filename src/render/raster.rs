//! 公式光栅化
//!
//! 默认实现 `GlyphRasterizer`：先把常用 LaTeX 子集线性化为 Unicode 数学文本
//! （希腊字母、运算符、`\frac`、`\sqrt`、上下标），再用 rusttype 按固定高度绘制。
//! 失败时由调用方换成 `placeholder_image`，占位图不依赖字体。

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use rusttype::{point, Font, PositionedGlyph, Scale};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RasterSettings;
use crate::error::{FolioError, FolioResult};

/// 单个公式的渲染失败；只在导出流程内部处理，不向外传播
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormulaRenderError {
    #[error("no font available for formula rendering")]
    NoFont,
    #[error("unbalanced braces")]
    Unbalanced,
    #[error("missing argument for {0}")]
    MissingArgument(String),
    #[error("unsupported command \\{0}")]
    UnsupportedCommand(String),
    #[error("glyph not in font: {0:?}")]
    MissingGlyph(char),
    #[error("formula is empty")]
    Empty,
    #[error("png encoding failed: {0}")]
    Encode(String),
}

/// PNG 字节 + 像素尺寸
#[derive(Debug, Clone)]
pub struct FormulaImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub trait FormulaRasterizer: Send + Sync {
    /// 渲染固定高度的公式图片
    fn rasterize(&self, expression: &str) -> Result<FormulaImage, FormulaRenderError>;

    /// 图片高度（像素），占位图使用相同高度
    fn height_px(&self) -> u32;
}

pub struct GlyphRasterizer {
    font: Option<Font<'static>>,
    settings: RasterSettings,
}

impl GlyphRasterizer {
    pub fn new(font: Option<Font<'static>>, settings: RasterSettings) -> Self {
        Self { font, settings }
    }

    /// 加载字体文件；字体不可用时仍然返回实例，之后每个公式都会走占位图
    pub fn from_font_path(path: Option<&Path>, settings: RasterSettings) -> Self {
        let font = path.and_then(|p| match std::fs::read(p) {
            Ok(bytes) => {
                let font = Font::try_from_vec(bytes);
                if font.is_none() {
                    warn!("[Render::Raster] Unparseable font file: {}", p.display());
                }
                font
            }
            Err(e) => {
                warn!("[Render::Raster] Cannot read font {}: {}", p.display(), e);
                None
            }
        });
        match path {
            Some(p) if font.is_some() => {
                info!("[Render::Raster] Formula font: {}", p.display())
            }
            _ => warn!("[Render::Raster] No formula font, formulas will use placeholders"),
        }
        Self::new(font, settings)
    }

    fn draw(&self, text: &str) -> Result<FormulaImage, FormulaRenderError> {
        let font = self.font.as_ref().ok_or(FormulaRenderError::NoFont)?;
        if let Some(missing) = text
            .chars()
            .find(|c| !c.is_whitespace() && font.glyph(*c).id().0 == 0)
        {
            return Err(FormulaRenderError::MissingGlyph(missing));
        }

        let height = self.settings.formula_height_px.max(8);
        let pad = self.settings.padding_px as f32;
        let scale = Scale::uniform((height as f32 - 2.0 * pad).max(4.0) * 0.8);
        let v_metrics = font.v_metrics(scale);
        let glyph_height = v_metrics.ascent - v_metrics.descent;
        let baseline = (height as f32 - glyph_height) / 2.0 + v_metrics.ascent;

        let glyphs: Vec<PositionedGlyph<'_>> =
            font.layout(text, scale, point(pad, baseline)).collect();
        let text_right = glyphs
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(pad);
        let width = (text_right + pad).ceil().max(1.0) as u32;

        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        for glyph in &glyphs {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|x, y, coverage| {
                    let px = x as i32 + bb.min.x;
                    let py = y as i32 + bb.min.y;
                    if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                        return;
                    }
                    let shade = 255 - (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                    let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                    if shade < pixel[0] {
                        *pixel = Rgba([shade, shade, shade, 255]);
                    }
                });
            }
        }

        let png = encode_png(canvas).map_err(|e| FormulaRenderError::Encode(e.to_string()))?;
        Ok(FormulaImage { png, width, height })
    }
}

impl FormulaRasterizer for GlyphRasterizer {
    fn rasterize(&self, expression: &str) -> Result<FormulaImage, FormulaRenderError> {
        let text = linearize(expression)?;
        if text.is_empty() {
            return Err(FormulaRenderError::Empty);
        }
        debug!("[Render::Raster] {:?} -> {:?}", expression, text);
        self.draw(&text)
    }

    fn height_px(&self) -> u32 {
        self.settings.formula_height_px.max(8)
    }
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}

/// 醒目的错误占位图：浅红底、红框、红色叉
pub fn placeholder_image(height: u32) -> FolioResult<FormulaImage> {
    let height = height.max(8);
    let width = height * 3;
    let red = Rgba([220, 38, 38, 255]);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([254, 226, 226, 255]));

    let border = (height / 16).max(2);
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let on_frame =
            x < border || y < border || x >= width - border || y >= height - border;
        // 两条对角线（按宽高比缩放）
        let diag = (x as i64 * height as i64 - y as i64 * width as i64).abs()
            <= (border as i64 * width as i64) / 2;
        let anti = (x as i64 * height as i64 - (height - 1 - y) as i64 * width as i64).abs()
            <= (border as i64 * width as i64) / 2;
        if on_frame || diag || anti {
            *pixel = red;
        }
    }

    let png = encode_png(canvas)
        .map_err(|e| FolioError::Export(format!("placeholder encoding failed: {}", e)))?;
    Ok(FormulaImage { png, width, height })
}

/// LaTeX 子集 → 单行 Unicode 文本
pub fn linearize(expression: &str) -> Result<String, FormulaRenderError> {
    let mut parser = Linearizer {
        chars: expression.chars().collect(),
        pos: 0,
    };
    let out = parser.sequence(false)?;
    Ok(out.trim().to_string())
}

struct Linearizer {
    chars: Vec<char>,
    pos: usize,
}

enum Script {
    Super,
    Sub,
}

impl Linearizer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_spaces(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// 读到组结束（`}`）或输入结束
    fn sequence(&mut self, in_group: bool) -> Result<String, FormulaRenderError> {
        let mut out = String::new();
        loop {
            let c = match self.next() {
                Some(c) => c,
                None if in_group => return Err(FormulaRenderError::Unbalanced),
                None => return Ok(out),
            };
            match c {
                '}' if in_group => return Ok(out),
                '}' => return Err(FormulaRenderError::Unbalanced),
                '{' => out.push_str(&self.sequence(true)?),
                '\\' => out.push_str(&self.command()?),
                '^' => {
                    let arg = self.argument("^")?;
                    out.push_str(&scripted(&arg, Script::Super));
                }
                '_' => {
                    let arg = self.argument("_")?;
                    out.push_str(&scripted(&arg, Script::Sub));
                }
                c if c.is_whitespace() => {
                    if !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                }
                '*' => out.push('∗'),
                '-' => out.push('−'),
                c => out.push(c),
            }
        }
    }

    /// 命令 / 上下标的参数：`{…}`、单个命令或单个字符
    fn argument(&mut self, owner: &str) -> Result<String, FormulaRenderError> {
        self.skip_spaces();
        match self.next() {
            None => Err(FormulaRenderError::MissingArgument(owner.to_string())),
            Some('{') => self.sequence(true),
            Some('}') => Err(FormulaRenderError::Unbalanced),
            Some('\\') => self.command(),
            Some(c) => Ok(c.to_string()),
        }
    }

    /// `[...]` 可选参数（不支持嵌套）
    fn optional_argument(&mut self) -> Result<Option<String>, FormulaRenderError> {
        if self.peek() != Some('[') {
            return Ok(None);
        }
        self.pos += 1;
        let mut raw = String::new();
        loop {
            match self.next() {
                Some(']') => break,
                Some(c) => raw.push(c),
                None => return Err(FormulaRenderError::Unbalanced),
            }
        }
        linearize(&raw).map(Some)
    }

    fn command(&mut self) -> Result<String, FormulaRenderError> {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
            name.push(c);
            self.pos += 1;
        }

        if name.is_empty() {
            return match self.next() {
                Some(',' | ';' | ':' | ' ' | '\\') => Ok(" ".to_string()),
                Some('!') => Ok(String::new()),
                Some(c @ ('{' | '}' | '%' | '$' | '&' | '#' | '_' | '|')) => Ok(c.to_string()),
                Some(c) => Err(FormulaRenderError::UnsupportedCommand(c.to_string())),
                None => Err(FormulaRenderError::UnsupportedCommand(String::new())),
            };
        }

        // 命令名后的空白属于命令本身
        self.skip_spaces();

        match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                let numerator = self.argument(&name)?;
                let denominator = self.argument(&name)?;
                Ok(format!("{}/{}", wrap(&numerator), wrap(&denominator)))
            }
            "sqrt" => {
                let index = self.optional_argument()?;
                let radicand = self.argument(&name)?;
                let root = match index.as_deref() {
                    None => "√".to_string(),
                    Some("3") => "∛".to_string(),
                    Some("4") => "∜".to_string(),
                    Some(n) => format!("{}√", scripted(n, Script::Super)),
                };
                Ok(format!("{}{}", root, wrap(&radicand)))
            }
            "text" | "textrm" | "mathrm" | "mathbf" | "mathit" | "operatorname" | "boldsymbol" => {
                self.argument(&name)
            }
            "left" | "right" | "big" | "Big" | "bigg" | "Bigg" | "displaystyle" => {
                if self.peek() == Some('.') {
                    self.pos += 1;
                }
                Ok(String::new())
            }
            "sin" | "cos" | "tan" | "cot" | "sec" | "csc" | "log" | "ln" | "lg" | "lim" | "max"
            | "min" | "exp" | "det" => {
                let spaced = self.peek().map_or(false, char::is_alphanumeric);
                Ok(if spaced {
                    format!("{} ", name)
                } else {
                    name.clone()
                })
            }
            other => symbol(other)
                .map(str::to_string)
                .ok_or_else(|| FormulaRenderError::UnsupportedCommand(other.to_string())),
        }
    }
}

fn wrap(s: &str) -> String {
    if s.chars().count() <= 1 || (s.starts_with('(') && s.ends_with(')')) {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

fn scripted(arg: &str, script: Script) -> String {
    let mapped: Option<String> = arg
        .chars()
        .map(|c| match script {
            Script::Super => superscript(c),
            Script::Sub => subscript(c),
        })
        .collect();
    match mapped {
        Some(s) if !s.is_empty() => s,
        _ => {
            let marker = match script {
                Script::Super => '^',
                Script::Sub => '_',
            };
            format!("{}{}", marker, wrap(arg))
        }
    }
}

fn superscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        '′' => '′',
        _ => return None,
    })
}

fn subscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'o' => 'ₒ',
        'x' => 'ₓ',
        _ => return None,
    })
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" | "vartheta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "times" => "×",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "cdot" => "·",
        "le" | "leq" | "leqslant" => "≤",
        "ge" | "geq" | "geqslant" => "≥",
        "ne" | "neq" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "propto" => "∝",
        "infty" => "∞",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "partial" => "∂",
        "nabla" => "∇",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" => "⇒",
        "Leftarrow" => "⇐",
        "Leftrightarrow" | "iff" => "⇔",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "cup" => "∪",
        "cap" => "∩",
        "emptyset" | "varnothing" => "∅",
        "forall" => "∀",
        "exists" => "∃",
        "angle" => "∠",
        "triangle" => "△",
        "perp" => "⊥",
        "parallel" => "∥",
        "circ" | "degree" => "°",
        "because" => "∵",
        "therefore" => "∴",
        "ldots" | "cdots" | "dots" => "…",
        "prime" => "′",
        "quad" => "  ",
        "qquad" => "    ",
        "lbrace" => "{",
        "rbrace" => "}",
        "langle" => "⟨",
        "rangle" => "⟩",
        _ => return None,
    })
}
