/// Style tag attached to each output line; the front end picks colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Out,
    Muted,
    Warn,
    Err,
    Success,
    Host,
}

/// Where the engine writes. Append-only apart from `clear`.
pub trait Sink {
    fn write(&mut self, text: &str, tone: Tone);

    fn clear(&mut self);

    fn show_image(&mut self, src: &str, caption: Option<&str>);

    fn hide_image(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    pub src: String,
    pub caption: Option<String>,
}

const TRANSCRIPT_LIMIT: usize = 2000;

/// Buffered sink: the terminal view renders it, tests inspect it.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<(String, Tone)>,
    image: Option<ImageView>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[(String, Tone)] {
        &self.lines
    }

    pub fn image(&self) -> Option<&ImageView> {
        self.image.as_ref()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lines.iter().any(|(line, _)| line.contains(text))
    }

    pub fn count(&self, text: &str) -> usize {
        self.lines.iter().filter(|(line, _)| line.contains(text)).count()
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(|(line, _)| line.as_str())
    }
}

impl Sink for Transcript {
    fn write(&mut self, text: &str, tone: Tone) {
        for line in text.split('\n') {
            self.lines.push((line.trim_end_matches('\r').to_string(), tone));
        }
        if self.lines.len() > TRANSCRIPT_LIMIT {
            let excess = self.lines.len() - TRANSCRIPT_LIMIT;
            self.lines.drain(..excess);
        }
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn show_image(&mut self, src: &str, caption: Option<&str>) {
        self.image = Some(ImageView {
            src: src.to_string(),
            caption: caption.map(str::to_string),
        });
    }

    fn hide_image(&mut self) {
        self.image = None;
    }
}
