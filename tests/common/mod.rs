//! Scripted collaborators shared by the integration tests
//!
//! `SimGame` is a tiny fake game: a list of screens, one button region, and
//! for each screen the screen a click on the button leads to. Perception and
//! the input device both look at the same game.

#![allow(dead_code)]

use bottom_up_agent::actions::{Operation, ScrollDirection};
use bottom_up_agent::actuation::{Hand, InputDevice};
use bottom_up_agent::core::config::AgentConfig;
use bottom_up_agent::core::error::Result;
use bottom_up_agent::core::types::{BoundingBox, ClusterId, Fingerprint, Point, Screen};
use bottom_up_agent::guidance::OperationGuide;
use bottom_up_agent::judge::{ClusterProposal, Judge, SkillNaming, Verdict};
use bottom_up_agent::memory::records::{Skill, SkillCluster};
use bottom_up_agent::perception::Perception;
use image::Rgb;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

pub const WIDTH: u32 = 120;
pub const HEIGHT: u32 = 120;
pub const BUTTON: BoundingBox = BoundingBox {
    x: 40,
    y: 40,
    width: 16,
    height: 16,
};

pub const GREY: [u8; 3] = [90, 90, 90];
pub const BLUE: [u8; 3] = [20, 20, 200];

/// Flat screen with a half-dark, half-light button
pub fn screen_with_button(background: [u8; 3]) -> Screen {
    let mut screen = Screen::from_pixel(WIDTH, HEIGHT, Rgb(background));
    for y in BUTTON.y..BUTTON.y + BUTTON.height {
        for x in BUTTON.x..BUTTON.x + BUTTON.width {
            let v = if x < BUTTON.x + BUTTON.width / 2 { 10 } else { 250 };
            screen.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    screen
}

/// `base` with a `w`x`h` white block painted at the bottom right
pub fn with_block(base: &Screen, w: u32, h: u32) -> Screen {
    let mut screen = base.clone();
    for y in HEIGHT - h..HEIGHT {
        for x in WIDTH - w..WIDTH {
            screen.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    screen
}

pub struct SimGame {
    pub screens: Vec<Screen>,
    /// Screen index a button click leads to, per screen
    pub on_click: Vec<Option<usize>>,
    pub current: usize,
    pub clicks: Vec<Point>,
    pub resets: usize,
}

impl SimGame {
    pub fn new(screens: Vec<Screen>, on_click: Vec<Option<usize>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            screens,
            on_click,
            current: 0,
            clicks: Vec::new(),
            resets: 0,
        }))
    }

    fn click(&mut self, at: Point) {
        self.clicks.push(at);
        let inside = at.x >= BUTTON.x as i32
            && at.x < (BUTTON.x + BUTTON.width) as i32
            && at.y >= BUTTON.y as i32
            && at.y < (BUTTON.y + BUTTON.height) as i32;
        if inside {
            if let Some(next) = self.on_click[self.current] {
                self.current = next;
            }
        }
    }
}

/// Background colour of the top-left pixel
pub fn fingerprint_of(screen: &Screen) -> Fingerprint {
    let p = screen.get_pixel(0, 0).0;
    Fingerprint::new(p.iter().map(|c| *c as f32 + 1.0).collect())
}

pub struct SimPerception {
    pub game: Rc<RefCell<SimGame>>,
}

impl Perception for SimPerception {
    fn capture_screen(&mut self) -> Result<Screen> {
        let game = self.game.borrow();
        Ok(game.screens[game.current].clone())
    }

    fn fingerprint(&mut self, screen: &Screen) -> Result<Fingerprint> {
        Ok(fingerprint_of(screen))
    }

    fn propose_regions(&mut self, _screen: &Screen) -> Result<Vec<BoundingBox>> {
        Ok(vec![BUTTON])
    }

    fn window_origin(&self) -> Point {
        Point::new(0, 0)
    }
}

/// Input device that drives the game; a right click goes back to screen 0
pub struct SimDevice {
    pub game: Rc<RefCell<SimGame>>,
}

impl InputDevice for SimDevice {
    fn click(&mut self, at: Point) -> Result<()> {
        self.game.borrow_mut().click(at);
        Ok(())
    }

    fn right_click(&mut self, _at: Point) -> Result<()> {
        let mut game = self.game.borrow_mut();
        game.current = 0;
        game.resets += 1;
        Ok(())
    }

    fn double_click(&mut self, at: Point) -> Result<()> {
        self.click(at)
    }

    fn drag(&mut self, _from: Point, _to: Point) -> Result<()> {
        Ok(())
    }

    fn scroll(&mut self, _at: Point, _direction: ScrollDirection) -> Result<()> {
        Ok(())
    }

    fn long_press(&mut self, at: Point, _hold: Duration) -> Result<()> {
        self.click(at)
    }

    fn type_text(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn hotkey(&mut self, _keys: &str) -> Result<()> {
        Ok(())
    }

    fn press_key(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }
}

pub fn sim_hand(game: &Rc<RefCell<SimGame>>) -> Hand<SimDevice> {
    Hand::new(SimDevice { game: game.clone() })
}

/// Picks the first candidate
pub struct FirstGuide;

impl OperationGuide for FirstGuide {
    fn choose(&mut self, candidates: &[Operation], _screen: &Screen) -> Result<Option<Operation>> {
        Ok(candidates.first().cloned())
    }
}

/// Judge answering from a script; every call is logged
#[derive(Default)]
pub struct ScriptedJudge {
    pub calls: Rc<RefCell<Vec<&'static str>>>,
    /// Pick the first offered cluster instead of declining
    pub pick_first_cluster: bool,
    pub verdicts: VecDeque<Option<Verdict>>,
    /// Name every operation sequence instead of calling it meaningless
    pub name_everything: bool,
    pub proposals: VecDeque<Operation>,
    pub progress: Option<bool>,
    /// Skills named so far
    pub named: usize,
}

impl ScriptedJudge {
    pub fn naming() -> Self {
        Self {
            name_everything: true,
            ..Self::default()
        }
    }

    fn log(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl Judge for ScriptedJudge {
    fn select_cluster(
        &mut self,
        _task: &str,
        clusters: &[SkillCluster],
        _screen: &Screen,
    ) -> Result<Option<ClusterId>> {
        self.log("select_cluster");
        Ok(clusters.first().filter(|_| self.pick_first_cluster).map(|c| c.id))
    }

    fn evaluate_skill(
        &mut self,
        _task: &str,
        _skill: &Skill,
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<Verdict>> {
        self.log("evaluate_skill");
        Ok(self.verdicts.pop_front().flatten())
    }

    fn name_skill(
        &mut self,
        operations: &[Operation],
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<SkillNaming>> {
        self.log("name_skill");
        if !self.name_everything {
            return Ok(None);
        }
        self.named += 1;
        Ok(Some(SkillNaming {
            name: format!("skill {}", self.named),
            description: format!("{} operation(s)", operations.len()),
        }))
    }

    fn cluster_skills(&mut self, skills: &[Skill]) -> Result<Option<Vec<ClusterProposal>>> {
        self.log("cluster_skills");
        Ok(Some(vec![ClusterProposal {
            cluster_id: None,
            name: "open menu".into(),
            description: "opens the blue menu".into(),
            members: skills.iter().map(|s| s.id).collect(),
        }]))
    }

    fn merge_skills(
        &mut self,
        _clusters: &[SkillCluster],
        _skills: &[Skill],
    ) -> Result<Option<Vec<ClusterProposal>>> {
        self.log("merge_skills");
        Ok(None)
    }

    fn propose_operation(&mut self, _task: &str, _screen: &Screen) -> Result<Option<Operation>> {
        self.log("propose_operation");
        Ok(self.proposals.pop_front())
    }

    fn evaluate_progress(
        &mut self,
        _task: &str,
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<bool>> {
        self.log("evaluate_progress");
        Ok(self.progress)
    }
}

/// Defaults with every delay removed and resets off
pub fn test_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.seed = Some(7);
    config.explore.exec_duration_secs = 0.0;
    config.explore.replay_delay_secs = 0.0;
    config.explore.close_reset = true;
    config
}
